//! 引擎对外暴露的数据模型。

pub mod health;
pub mod track;
