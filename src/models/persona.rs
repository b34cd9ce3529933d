//! 人设配置
//!
//! 人设（评估视角）从 TOML 文件加载，每个人设对应一个独立的人设评估
//! 阶段。文件缺失时使用内置默认人设，保证流水线总有至少一个人设视角。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::info;

/// 一个评估人设
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    /// 人设名（写入事件标签）
    pub label: String,
    /// 人设立场描述（拼入提示词）
    pub description: String,
}

/// personas.toml 的文件结构
#[derive(Debug, Deserialize)]
struct PersonaFile {
    personas: Vec<Persona>,
}

/// 内置默认人设
pub fn default_personas() -> Vec<Persona> {
    vec![
        Persona {
            label: "大学教授".to_string(),
            description: "从事该领域研究多年的大学教授，关注论证的严密性和内容深度".to_string(),
        },
        Persona {
            label: "普通大学生".to_string(),
            description: "不具备专业背景的大学生听众，关注内容是否易于理解".to_string(),
        },
        Persona {
            label: "企业评审".to_string(),
            description: "企业的发表评审，关注表达是否有说服力、结论是否落地".to_string(),
        },
    ]
}

/// 从 TOML 文件加载人设列表
///
/// 文件不存在时返回内置默认人设；文件存在但无法解析时报错。
pub async fn load_personas(path: &str) -> Result<Vec<Persona>> {
    if !Path::new(path).exists() {
        info!("人设配置文件 {} 不存在，使用内置默认人设", path);
        return Ok(default_personas());
    }

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取人设配置文件: {}", path))?;

    let file: PersonaFile =
        toml::from_str(&content).with_context(|| format!("无法解析人设配置文件: {}", path))?;

    if file.personas.is_empty() {
        info!("人设配置文件 {} 为空，使用内置默认人设", path);
        return Ok(default_personas());
    }

    info!("✓ 从 {} 加载了 {} 个人设", path, file.personas.len());
    Ok(file.personas)
}
