use crate::app::ConvertError;
use crate::extract::MarkupConverter;

/// HTML → Markdown via `htmd`
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownConverter;

impl MarkupConverter for MarkdownConverter {
    fn convert(&self, html: &str) -> Result<String, ConvertError> {
        htmd::convert(html).map_err(|e| ConvertError(e.to_string()))
    }
}
