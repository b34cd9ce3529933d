//! 提交端点
//!
//! `POST /evaluate`：multipart 表单上传幻灯片（slide）、录音（audio）、
//! 用户标识（user_id）和可选通知地址（notify_to）。先转写录音得到
//! 文字稿，随后把流水线派发为后台任务，响应体是逐行推送的 NDJSON
//! 事件流。调用方断开连接即触发对剩余阶段的尽力取消。

use axum::{
    body::Body,
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use crate::api::server::AppContext;
use crate::models::Submission;
use crate::stream::ResultStream;

/// GET /health - 存活探针
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// 解析后的 multipart 字段
struct EvaluateForm {
    slide: Vec<u8>,
    audio: Vec<u8>,
    user_id: String,
    notify_to: Option<String>,
}

/// POST /evaluate - 提交一次发表评估
pub async fn evaluate(
    State(ctx): State<AppContext>,
    multipart: Multipart,
) -> Result<Response, (StatusCode, String)> {
    let form = parse_form(multipart).await?;
    info!(
        "收到评估提交 (用户: {}, 幻灯片 {} 字节, 录音 {} 字节)",
        form.user_id,
        form.slide.len(),
        form.audio.len()
    );

    // 转写在流水线之前完成：文字稿是 Submission 的派生组成部分
    let transcript = ctx
        .transcriber
        .transcribe(&form.audio, "recording.wav")
        .await
        .map_err(|e| {
            error!("音频转写失败: {}", e);
            (StatusCode::BAD_GATEWAY, format!("音频转写失败: {}", e))
        })?;

    let submission = Arc::new(Submission::new(
        form.user_id,
        form.slide,
        form.audio,
        transcript,
        form.notify_to,
    ));
    let submission_id = submission.submission_id;

    // 派发为后台任务：接收新提交的进程不被评估阻塞
    let (stream, rx) = ResultStream::channel();
    let stream = Arc::new(stream);
    let scheduler = ctx.scheduler.clone();
    tokio::spawn(async move {
        if let Err(e) = scheduler.run(submission, stream).await {
            error!("评估以错误收场 (提交: {}): {}", submission_id, e);
        }
    });

    // 每条事件一行 NDJSON；接收端被丢弃（调用方断开）时发送侧报错，
    // 调度器据此取消剩余阶段
    let body_stream =
        ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(event.to_ndjson_line()));

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(body_stream),
    )
        .into_response())
}

/// 解析 multipart 表单字段
async fn parse_form(mut multipart: Multipart) -> Result<EvaluateForm, (StatusCode, String)> {
    let mut slide = None;
    let mut audio = None;
    let mut user_id = None;
    let mut notify_to = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("表单解析失败: {}", e)))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("slide") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, format!("读取幻灯片失败: {}", e)))?;
                slide = Some(bytes.to_vec());
            }
            Some("audio") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, format!("读取录音失败: {}", e)))?;
                audio = Some(bytes.to_vec());
            }
            Some("user_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, format!("读取用户标识失败: {}", e)))?;
                user_id = Some(text);
            }
            Some("notify_to") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, format!("读取通知地址失败: {}", e)))?;
                if !text.trim().is_empty() {
                    notify_to = Some(text);
                }
            }
            _ => {}
        }
    }

    let slide = slide.ok_or((StatusCode::BAD_REQUEST, "缺少 slide 字段".to_string()))?;
    let audio = audio.ok_or((StatusCode::BAD_REQUEST, "缺少 audio 字段".to_string()))?;
    let user_id = user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "缺少 user_id 字段".to_string()))?;

    Ok(EvaluateForm {
        slide,
        audio,
        user_id,
        notify_to,
    })
}
