use serde::{Deserialize, Serialize};

/// 上游 OCR/版面分析给出的表格结构 (可选)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLayout {
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
    pub text: String,
    pub column_index: usize,
    pub row_index: usize,
}

impl TableRow {
    /// 按列顺序拼接整行文本
    pub fn joined_text(&self) -> String {
        let mut cells: Vec<&TableCell> = self.cells.iter().collect();
        cells.sort_by_key(|c| c.column_index);
        cells
            .iter()
            .map(|c| c.text.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joined_text_follows_column_order() {
        let cell = |text: &str, column_index: usize| TableCell {
            text: text.to_string(),
            column_index,
            row_index: 0,
        };
        let row = TableRow {
            cells: vec![cell(" 45'310.50 ", 2), cell("CH0012005267", 0), cell("Novartis AG", 1)],
        };
        assert_eq!(row.joined_text(), "CH0012005267 Novartis AG 45'310.50");
    }
}
