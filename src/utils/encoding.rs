//! 二进制内容的编码辅助

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// base64 编码
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// 把 PNG 字节编码为可内联进判断请求的 data URL
pub fn png_data_url(bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", encode_base64(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_data_url_prefix() {
        let url = png_data_url(&[0x89, 0x50, 0x4e, 0x47]);
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(url, "data:image/png;base64,iVBORw==");
    }
}
