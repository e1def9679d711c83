//! `/jm <id>`: download a comic and send it back as a PDF

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::application::errors::{BotError, JobError};
use crate::application::services::{PermissionGate, PrivateOnly, TaskController};
use crate::domain::entities::{
    Artifact, ChatRef, Command, Component, FailureReason, FileSource, JobEvent, JobOutcome, Message,
};
use crate::domain::traits::{Bot, JobSink};
use crate::plugins::trait_def::Plugin;

pub const PLUGIN_NAME: &str = "jm2pdf";

const USAGE: &str = "/jm <漫画ID>";

pub struct Jm2PdfPlugin {
    /// `None` when the downloader could not be set up at startup
    controller: Option<Arc<TaskController>>,
    permission: PermissionGate,
    send_progress: bool,
}

impl Jm2PdfPlugin {
    pub fn new(controller: Option<Arc<TaskController>>, permission: PermissionGate, send_progress: bool) -> Self {
        Self {
            controller,
            permission,
            send_progress,
        }
    }

    async fn reply(&self, bot: &dyn Bot, chat: &ChatRef, text: &str) {
        if let Err(e) = bot.send_message(chat, text).await {
            tracing::warn!(chat = chat.id(), error = %e, "failed to send reply");
        }
    }
}

#[async_trait]
impl Plugin for Jm2PdfPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn description(&self) -> &str {
        "下载禁漫天堂漫画并转换为PDF"
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new("jm")
            .with_description("下载漫画并转换为PDF")
            .with_usage(USAGE)
            .with_plugin(PLUGIN_NAME)]
    }

    async fn initialize(&self) -> Result<(), BotError> {
        match &self.controller {
            Some(controller) => {
                let settings = controller.settings();
                tracing::info!(
                    download_dir = %settings.download_dir.display(),
                    limit = ?controller.gate().limit(),
                    timeout = ?settings.timeout,
                    keep_images = settings.keep_images,
                    keep_pdf = settings.keep_pdf,
                    "jm2pdf ready"
                );
            }
            None => tracing::error!("jm2pdf has no downloader; /jm will report missing dependencies"),
        }
        Ok(())
    }

    async fn handle_command(
        &self,
        _name: &str,
        message: &Message,
        args: &[String],
        bot: &dyn Bot,
    ) -> Result<(), BotError> {
        if let PrivateOnly::Block(text) = self.permission.check_private_only(message) {
            self.reply(bot, &message.chat, &text).await;
            return Ok(());
        }
        if !self.permission.check_whitelist(message) {
            return Ok(());
        }

        let Some(controller) = &self.controller else {
            self.reply(bot, &message.chat, "❌ 缺少必要的依赖，请先安装 jmcomic").await;
            return Ok(());
        };

        let Some(comic_id) = args.first() else {
            self.reply(bot, &message.chat, &format!("请提供漫画ID\n使用方法: {}", USAGE)).await;
            return Ok(());
        };

        tracing::info!(comic_id = %comic_id, user = message.sender_id(), chat = message.chat.id(), "jm request");

        let sink = ChatSink {
            bot,
            chat: message.chat.clone(),
            send_progress: self.send_progress,
        };
        match controller.run(comic_id, &sink).await {
            Ok(outcome) => {
                if let Some(text) = outcome_text(&outcome) {
                    self.reply(bot, &message.chat, &text).await;
                }
            }
            Err(JobError::InvalidId(id)) => {
                let text = format!("❌ 无效的漫画ID格式: {}\n请输入纯数字ID，例如: /jm 123456", id);
                self.reply(bot, &message.chat, &text).await;
            }
            Err(e) => {
                tracing::error!(comic_id = %comic_id, error = %e, "jm job could not start");
                self.reply(bot, &message.chat, &format!("❌ 处理失败: {}", e)).await;
            }
        }
        Ok(())
    }

    async fn terminate(&self) {
        tracing::info!("jm2pdf unloaded");
    }

    fn metadata(&self) -> HashMap<String, String> {
        HashMap::from([
            ("command".to_string(), "jm".to_string()),
            ("available".to_string(), self.controller.is_some().to_string()),
        ])
    }
}

/// Sends a job's progress and artifact to the chat that asked for it
pub struct ChatSink<'a> {
    pub bot: &'a dyn Bot,
    pub chat: ChatRef,
    /// Routine progress is optional; warnings always go out
    pub send_progress: bool,
}

#[async_trait]
impl JobSink for ChatSink<'_> {
    async fn progress(&self, event: JobEvent) {
        if !self.send_progress && !is_warning(&event) {
            return;
        }
        if let Err(e) = self.bot.send_message(&self.chat, &event_text(&event)).await {
            tracing::warn!(chat = self.chat.id(), error = %e, "failed to send progress message");
        }
    }

    async fn deliver(&self, artifact: &Artifact) -> Result<(), BotError> {
        let file = Component::File {
            name: artifact.file_name.clone(),
            source: FileSource::Path(artifact.path.clone()),
        };
        self.bot.send_chain(&self.chat, &[file]).await?;
        tracing::info!(path = %artifact.path.display(), cached = artifact.cached, "pdf sent");
        Ok(())
    }
}

fn is_warning(event: &JobEvent) -> bool {
    matches!(event, JobEvent::Oversize { .. })
}

pub fn event_text(event: &JobEvent) -> String {
    match event {
        JobEvent::Queued { position } => format!(
            "⏳ 当前下载任务较多，您的请求正在排队...\n📊 前方还有 {} 个任务",
            position
        ),
        JobEvent::Started { comic_id, waited: true } => {
            format!("✅ 轮到您了！开始下载漫画 {}...", comic_id)
        }
        JobEvent::Started { comic_id, waited: false } => {
            format!("📥 开始下载漫画 {}，请稍候...", comic_id)
        }
        JobEvent::CachedArtifact => "📄 检测到已下载的PDF，直接发送...".to_string(),
        JobEvent::Downloaded => "✅ 下载完成，开始转换PDF...".to_string(),
        JobEvent::TimedOut { minutes } => {
            format!("⚠️ 下载任务超时（{}分钟），尝试转换已下载的图片...", minutes)
        }
        JobEvent::Oversize { size_mb, limit_mb } => format!(
            "⚠️ 警告: PDF文件过大 ({:.2} MB > {} MB)\n可能发送失败或需要较长时间",
            size_mb, limit_mb
        ),
        JobEvent::Ready { size_mb, partial: true } => {
            format!("✅ 已将部分下载的图片转换为PDF ({:.2} MB)，准备发送...", size_mb)
        }
        JobEvent::Ready { size_mb, partial: false } => {
            format!("✅ PDF生成成功 ({:.2} MB)，准备发送...", size_mb)
        }
        JobEvent::PartialNotice => "⚠️ 注意：此PDF仅包含超时前下载的部分图片".to_string(),
    }
}

/// Final reply for outcomes that did not end with a file in the chat
pub fn outcome_text(outcome: &JobOutcome) -> Option<String> {
    match outcome {
        JobOutcome::Delivered(_) => None,
        JobOutcome::Refused { size_mb, limit_mb } => Some(format!(
            "⚠️ PDF文件过大 ({:.2}MB > {}MB)，无法发送",
            size_mb, limit_mb
        )),
        JobOutcome::Failed(FailureReason::NoImagesAfterTimeout) => {
            Some("❌ 下载超时且未能找到可转换的图片".to_string())
        }
        JobOutcome::Failed(FailureReason::NoImages) => Some("❌ PDF文件生成失败".to_string()),
        JobOutcome::Failed(reason) => Some(format!("❌ 处理失败: {}", reason)),
    }
}
