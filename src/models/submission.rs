//! 提交物
//!
//! 一次入站请求创建一个 Submission，创建后不可变，由唯一的一次流水线
//! 运行独占。

use uuid::Uuid;

/// 待评估的提交物
#[derive(Debug)]
pub struct Submission {
    /// 提交标识
    pub submission_id: Uuid,
    /// 提交用户
    pub user_id: String,
    /// 幻灯片文档（PDF 字节）
    pub slide_document: Vec<u8>,
    /// 发表录音（音频字节）
    pub audio_recording: Vec<u8>,
    /// 由录音转写得到的文字稿
    pub transcript_text: String,
    /// 完成通知地址（可选）
    pub notification_address: Option<String>,
}

impl Submission {
    pub fn new(
        user_id: impl Into<String>,
        slide_document: Vec<u8>,
        audio_recording: Vec<u8>,
        transcript_text: impl Into<String>,
        notification_address: Option<String>,
    ) -> Self {
        Self {
            submission_id: Uuid::new_v4(),
            user_id: user_id.into(),
            slide_document,
            audio_recording,
            transcript_text: transcript_text.into(),
            notification_address,
        }
    }
}
