use serde::{Deserialize, Serialize};

/// 原始分词 (按空白切分，一次解析后不再修改)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawToken {
    pub text: String,
    pub line: usize,
    pub char_offset: usize, // UTF-8 字节偏移
}

/// 实体所在区域：明细行 or 汇总区
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    LineItem,
    Summary,
}

/// 证券代码匹配结果 (同一代码可能出现多次)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub code: String,
    pub line: usize,
    pub offset: usize,
    pub context: String, // 实体所在行文本
    pub section: Section,
}

impl Entity {
    /// 实体在原文中的结束偏移 (不含)
    pub fn end(&self) -> usize {
        self.offset + self.code.len()
    }
}
