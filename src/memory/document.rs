//! 文档摄取：原始文件 -> 文本
//!
//! 只内置纯文本 / Markdown 解析；PDF、DOCX 需要外部解析器实现 DocumentParser。

use std::path::Path;

use crate::memory::MemoryError;

/// 文档解析器
pub trait DocumentParser: Send + Sync {
    /// 将原始字节解析为文本；name 为文件名（用于判断格式）
    fn parse(&self, raw: &[u8], name: &str) -> Result<String, MemoryError>;
}

/// 纯文本解析器（txt / md / csv / log / 无扩展名）
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextParser;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "csv", "log", "text"];

impl DocumentParser for PlainTextParser {
    fn parse(&self, raw: &[u8], name: &str) -> Result<String, MemoryError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            None => {}
            Some(e) if TEXT_EXTENSIONS.contains(&e) => {}
            Some(other) => return Err(MemoryError::UnsupportedFormat(other.to_string())),
        }
        let text = String::from_utf8_lossy(raw);
        // 去掉 BOM 与首尾空白
        Ok(text.trim_start_matches('\u{feff}').trim().to_string())
    }
}

/// 读取并解析文件
pub async fn load_document(
    path: impl AsRef<Path>,
    parser: &dyn DocumentParser,
) -> Result<String, MemoryError> {
    let path = path.as_ref();
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| MemoryError::Io(format!("{}: {}", path.display(), e)))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    parser.parse(&raw, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_strips_bom() {
        let parsed = PlainTextParser
            .parse("\u{feff}Hello\n".as_bytes(), "notes.md")
            .unwrap();
        assert_eq!(parsed, "Hello");
    }

    #[test]
    fn test_pdf_unsupported() {
        let err = PlainTextParser.parse(b"%PDF-1.7", "paper.PDF").unwrap_err();
        assert_eq!(err, MemoryError::UnsupportedFormat("pdf".to_string()));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = load_document("/nonexistent/file.txt", &PlainTextParser)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Io(_)));
    }
}
