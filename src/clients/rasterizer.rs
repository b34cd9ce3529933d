//! 幻灯片光栅化协作方
//!
//! 文档字节 + 页码 → PNG 位图。构成评估把前几页作为图片附给判断
//! 协作方，幻灯片补救阶段把问题页的位图附给第二次判断调用。

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{CollaboratorError, EvalError, EvalResult};

/// 幻灯片光栅化协作方接口
#[async_trait]
pub trait SlideRasterizer: Send + Sync {
    /// 文档总页数
    async fn page_count(&self, document: &[u8]) -> EvalResult<u32>;

    /// 把指定页（1 起）渲染为 PNG 字节
    async fn rasterize(&self, document: &[u8], page: u32) -> EvalResult<Vec<u8>>;
}

/// 光栅化 HTTP 服务的默认实现
pub struct HttpSlideRasterizer {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct DocumentInfo {
    pages: u32,
}

impl HttpSlideRasterizer {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.rasterizer_api_base_url.clone(),
        }
    }
}

#[async_trait]
impl SlideRasterizer for HttpSlideRasterizer {
    async fn page_count(&self, document: &[u8]) -> EvalResult<u32> {
        let endpoint = format!("{}/info", self.base_url);
        let form = reqwest::multipart::Form::new().part(
            "document",
            reqwest::multipart::Part::bytes(document.to_vec()).file_name("slides.pdf"),
        );

        let response = self.http.post(&endpoint).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EvalError::Collaborator(CollaboratorError::BadStatus {
                endpoint,
                status: status.as_u16(),
                body: crate::utils::logging::truncate_text(&body, 200),
            }));
        }

        let info: DocumentInfo = response.json().await?;
        Ok(info.pages)
    }

    async fn rasterize(&self, document: &[u8], page: u32) -> EvalResult<Vec<u8>> {
        let endpoint = format!("{}/rasterize", self.base_url);
        debug!("光栅化第 {} 页", page);

        let form = reqwest::multipart::Form::new()
            .part(
                "document",
                reqwest::multipart::Part::bytes(document.to_vec()).file_name("slides.pdf"),
            )
            .text("page", page.to_string());

        let response = self.http.post(&endpoint).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EvalError::Collaborator(CollaboratorError::BadStatus {
                endpoint,
                status: status.as_u16(),
                body: crate::utils::logging::truncate_text(&body, 200),
            }));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(EvalError::Collaborator(CollaboratorError::EmptyResponse {
                endpoint,
            }));
        }
        Ok(bytes.to_vec())
    }
}
