//! Markdown to HTML for upload.

use docmd_core::{RenderError, Renderer};
use pulldown_cmark::{Event, Options, Parser, html};

const DOCUMENT_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<style>
  body { font-family: Arial, sans-serif; }
  code { background-color: #f4f4f4; padding: 2px 4px; font-family: monospace; }
  pre { background-color: #f4f4f4; padding: 10px; overflow-x: auto; }
  pre code { padding: 0; background: none; }
  blockquote { border-left: 3px solid #ccc; margin-left: 0; padding-left: 15px; color: #666; }
</style>
</head>
<body>
"#;

const DOCUMENT_TAIL: &str = "</body>\n</html>";

/// CommonMark + GFM renderer. Soft line breaks are kept as hard breaks so the
/// document keeps the author's line layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownRenderer;

impl MarkdownRenderer {
    pub fn to_html(source: &str) -> String {
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_FOOTNOTES;
        let parser = Parser::new_ext(source, options).map(|event| match event {
            Event::SoftBreak => Event::HardBreak,
            other => other,
        });

        let mut out = String::with_capacity(DOCUMENT_HEAD.len() + source.len() * 3 / 2);
        out.push_str(DOCUMENT_HEAD);
        html::push_html(&mut out, parser);
        out.push_str(DOCUMENT_TAIL);
        out
    }
}

impl Renderer for MarkdownRenderer {
    fn render(&self, source: &[u8]) -> Result<String, RenderError> {
        let text = std::str::from_utf8(source)
            .map_err(|e| RenderError(format!("file is not valid UTF-8: {e}")))?;
        Ok(Self::to_html(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraps_in_styled_document() {
        let html = MarkdownRenderer::to_html("# Title");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.ends_with("</body>\n</html>"));
    }

    #[test]
    fn test_soft_breaks_become_hard_breaks() {
        let html = MarkdownRenderer::to_html("line one\nline two");
        assert!(html.contains("line one<br />"));
    }

    #[test]
    fn test_gfm_extensions() {
        let html = MarkdownRenderer::to_html(
            "| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~\n\n- [x] done\n",
        );
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("type=\"checkbox\""));
    }

    #[test]
    fn test_invalid_utf8_is_render_error() {
        assert!(MarkdownRenderer.render(&[0xff, 0xfe, 0x00]).is_err());
        assert!(MarkdownRenderer.render("ok".as_bytes()).is_ok());
    }
}
