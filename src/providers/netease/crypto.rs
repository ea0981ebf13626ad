//! 网易云封面图片路径的编码。
//!
//! 普通搜索接口只返回专辑的 `picId`，封面链接中的路径段需要由它推导：
//! 先与固定密钥逐字节异或，再取 MD5，Base64 编码后替换为 URL 安全字符。

use base64::{Engine, prelude::BASE64_STANDARD};
use md5::{Digest, Md5 as Md5Hasher};

/// 封面路径使用的异或密钥。
const PIC_ID_KEY: &[u8] = b"3go8&$8*3*3h0k(2)2";

/// 计算 `picId` 对应的封面路径段。
pub fn encrypt_pic_id(pic_id: &str) -> String {
    let xored: Vec<u8> = pic_id
        .bytes()
        .enumerate()
        .map(|(i, b)| b ^ PIC_ID_KEY[i % PIC_ID_KEY.len()])
        .collect();

    let mut hasher = Md5Hasher::new();
    hasher.update(&xored);
    let digest = hasher.finalize();

    BASE64_STANDARD
        .encode(digest)
        .replace('/', "_")
        .replace('+', "-")
}
