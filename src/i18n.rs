//! Console strings for the `archive` and `variants` commands.
//! Selected with the global `--locale` flag (e.g. `--locale zh`).

use crate::core::model::SessionPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" | "zh_cn" | "zh-hans" | "zh-tw" | "zh_tw" => Self::Zh,
            _ => Self::En,
        }
    }
}

pub struct Messages {
    pub session_started: &'static str,
    pub session_finished: &'static str,
    pub summary_header: &'static str,
    pub variant_selected: &'static str,
    pub media_playlist: &'static str,
    pub horizon: &'static str,
    pub discovered: &'static str,
    pub segments_label: &'static str,
    pub outcome_completed: &'static str,
    pub outcome_gaps: &'static str,
    pub outcome_failed: &'static str,
    pub output_label: &'static str,
    pub missing_label: &'static str,
    pub work_dir_label: &'static str,
    pub interrupt_hint: &'static str,
    pub interrupt_forced: &'static str,
    pub resume_hint: &'static str,
    pub variants_header: &'static str,
    pub no_variants: &'static str,
    pub error_prefix: &'static str,
    pub warn_prefix: &'static str,
    pub info_prefix: &'static str,
    pub phase_prefix: &'static str,
}

pub static EN: Messages = Messages {
    session_started: "Session started",
    session_finished: "Session finished",
    summary_header: "Summary",
    variant_selected: "variant",
    media_playlist: "media playlist",
    horizon: "backlog up to index",
    discovered: "new live segments",
    segments_label: "segments",
    outcome_completed: "completed",
    outcome_gaps: "completed with gaps",
    outcome_failed: "failed",
    output_label: "output",
    missing_label: "missing segments",
    work_dir_label: "segment directory",
    interrupt_hint: "Interrupted: finishing with the segments downloaded so far (press Ctrl-C again to abort)",
    interrupt_forced: "Aborted; segments downloaded so far stay on disk",
    resume_hint: "resume with --work-dir <dir> --keep-segments",
    variants_header: "Available variants",
    no_variants: "The playlist lists no variants; it is a media playlist",
    error_prefix: "ERR",
    warn_prefix: "WARN",
    info_prefix: "INFO",
    phase_prefix: "PHASE",
};

pub static ZH: Messages = Messages {
    session_started: "会话已启动",
    session_finished: "会话已结束",
    summary_header: "摘要",
    variant_selected: "视频流",
    media_playlist: "媒体播放列表",
    horizon: "回溯至分片序号",
    discovered: "新的直播分片",
    segments_label: "分片",
    outcome_completed: "完成",
    outcome_gaps: "完成（有缺失）",
    outcome_failed: "失败",
    output_label: "输出文件",
    missing_label: "缺失分片",
    work_dir_label: "分片目录",
    interrupt_hint: "已中断：正在用已下载的分片合并（再次按 Ctrl-C 立即退出）",
    interrupt_forced: "已强制退出；已下载的分片保留在磁盘上",
    resume_hint: "可用 --work-dir <目录> --keep-segments 继续",
    variants_header: "可用视频流",
    no_variants: "该播放列表没有多码率条目，是媒体播放列表",
    error_prefix: "错误",
    warn_prefix: "警告",
    info_prefix: "信息",
    phase_prefix: "阶段",
};

pub fn get_messages(locale: Locale) -> &'static Messages {
    match locale {
        Locale::En => &EN,
        Locale::Zh => &ZH,
    }
}

pub fn phase_label(locale: Locale, phase: SessionPhase) -> &'static str {
    match (locale, phase) {
        (Locale::En, SessionPhase::Resolving) => "resolving",
        (Locale::En, SessionPhase::BackfillDownload) => "downloading backlog",
        (Locale::En, SessionPhase::LiveTail) => "following live stream",
        (Locale::En, SessionPhase::Assembling) => "assembling",
        (Locale::En, SessionPhase::Cleanup) => "cleaning up",
        (Locale::En, SessionPhase::Completed) => "completed",
        (Locale::En, SessionPhase::CompletedWithGaps) => "completed with gaps",
        (Locale::En, SessionPhase::Failed) => "failed",
        (Locale::Zh, SessionPhase::Resolving) => "解析中",
        (Locale::Zh, SessionPhase::BackfillDownload) => "下载历史分片",
        (Locale::Zh, SessionPhase::LiveTail) => "跟随直播",
        (Locale::Zh, SessionPhase::Assembling) => "合并中",
        (Locale::Zh, SessionPhase::Cleanup) => "清理中",
        (Locale::Zh, SessionPhase::Completed) => "完成",
        (Locale::Zh, SessionPhase::CompletedWithGaps) => "完成（有缺失）",
        (Locale::Zh, SessionPhase::Failed) => "失败",
    }
}
