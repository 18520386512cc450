//! 类别名称映射
//!
//! 标签文件只做简单的 `"id": "name"` 模式扫描, 不是完整的 JSON 解析:
//! 格式错误的文件只会得到部分或空映射.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#""(\d+)"\s*:\s*"([^"]+)""#).unwrap_or_else(|e| unreachable!("{e}"))
    })
}

/// 类别ID → 名称
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LabelMap {
    names: HashMap<usize, String>,
}

impl LabelMap {
    /// 从文本内容解析
    pub fn parse(content: &str) -> Self {
        let mut names = HashMap::new();
        for caps in label_pattern().captures_iter(content) {
            let Ok(id) = caps[1].parse::<usize>() else {
                continue;
            };
            names.insert(id, caps[2].to_string());
        }
        Self { names }
    }

    /// 从文件加载 (仅I/O错误会失败)
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 获取类别名称, 缺失时回退为 "Class <id>"
    pub fn label(&self, class_id: usize) -> String {
        match self.names.get(&class_id) {
            Some(name) => name.clone(),
            None => format!("Class {}", class_id),
        }
    }
}
