//! CLI 모듈
//!
//! l2gpt CLI 명령어 정의 및 구현.
//! 하위 명령어 없이 실행하면 대화형 채팅 모드로 들어갑니다.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::assistant::{QueryOutcome, ResearchSession, ResponseEnvelope};
use crate::config::{Settings, API_KEY_ENV, MAX_SEARCH_DEPTH, MIN_SEARCH_DEPTH};
use crate::dataset;
use crate::knowledge::{IndexCache, IndexStatus, Retriever};
use crate::render;
use crate::storage::{FeedbackKind, SessionStore};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "l2gpt")]
#[command(version, about = "비트코인 레이어2 리서치 어시스턴트", long_about = None)]
pub struct Cli {
    /// CSV 데이터셋 경로
    #[arg(long, global = true)]
    pub dataset: Option<PathBuf>,

    /// 대화 기록/피드백/인덱스 캐시 디렉토리
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// 세션 ID (없으면 새 세션)
    #[arg(short, long, global = true)]
    pub session: Option<String>,

    /// 검색 깊이 (검색할 청크 수)
    #[arg(short, long, global = true, value_parser = clap::value_parser!(u8).range(3..=15))]
    pub depth: Option<u8>,

    /// 후속 질문 개수
    #[arg(long, global = true)]
    pub followups: Option<usize>,

    /// OpenRouter API 키 (환경변수보다 우선)
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// 모델 추론 과정 표시
    #[arg(long, global = true)]
    pub show_reasoning: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 대화형 채팅 (기본)
    Chat,

    /// 질문 하나에 답변
    Ask {
        /// 질문
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// 인덱스 확인 및 빌드
    Index {
        /// 캐시를 무시하고 강제 재빌드
        #[arg(long)]
        force: bool,
    },

    /// 상태 확인
    Status,

    /// 세션 대화 기록 출력
    History {
        /// HTML 파일로 내보내기
        #[arg(long)]
        html: Option<PathBuf>,
    },

    /// 저장된 세션 목록
    Sessions,

    /// 세션 대화 기록 삭제
    Clear,

    /// 답변 피드백 저장
    Feedback {
        /// 피드백 종류
        #[arg(value_enum)]
        kind: FeedbackArg,

        /// 피드백 내용 (부정 피드백은 필수)
        #[arg(short, long, default_value = "")]
        text: String,

        /// 대상 질문 (없으면 세션의 마지막 질문)
        #[arg(short, long)]
        query: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FeedbackArg {
    Positive,
    Negative,
}

impl From<FeedbackArg> for FeedbackKind {
    fn from(arg: FeedbackArg) -> Self {
        match arg {
            FeedbackArg::Positive => FeedbackKind::Positive,
            FeedbackArg::Negative => FeedbackKind::Negative,
        }
    }
}

impl Cli {
    /// 환경변수 설정에 CLI 플래그 적용
    pub fn apply(&self, mut settings: Settings) -> Settings {
        settings = settings.with_api_key_override(self.api_key.clone());
        if let Some(ref path) = self.dataset {
            settings.dataset_path = path.clone();
        }
        if let Some(ref dir) = self.data_dir {
            settings.data_dir = dir.clone();
        }
        if let Some(depth) = self.depth {
            settings.set_search_depth(depth as usize);
        }
        if let Some(count) = self.followups {
            settings.followup_count = count;
        }
        settings
    }
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let settings = cli.apply(Settings::from_env());
    let session_id = cli.session.clone();
    let show_reasoning = cli.show_reasoning;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => cmd_chat(settings, session_id, show_reasoning).await,
        Commands::Ask { question } => {
            cmd_ask(settings, session_id, &question.join(" "), show_reasoning).await
        }
        Commands::Index { force } => cmd_index(settings, force).await,
        Commands::Status => cmd_status(settings),
        Commands::History { html } => cmd_history(settings, session_id, html.as_deref()),
        Commands::Sessions => cmd_sessions(settings),
        Commands::Clear => cmd_clear(settings, session_id),
        Commands::Feedback { kind, text, query } => {
            cmd_feedback(settings, session_id, kind.into(), &text, query.as_deref())
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 대화형 채팅 명령어 (chat)
///
/// 에러는 출력만 하고 다음 입력을 계속 받습니다.
async fn cmd_chat(
    settings: Settings,
    session_id: Option<String>,
    mut show_reasoning: bool,
) -> Result<()> {
    let mut session =
        ResearchSession::from_settings(settings, session_id).context("세션 생성 실패")?;

    println!("Bitcoin L2 Research Assistant v{}", env!("CARGO_PKG_VERSION"));
    println!("[*] 세션: {}", session.id());
    println!("[*] 데이터셋 인덱싱 중: {}", session.settings().dataset_path.display());

    match session.initialize().await {
        Ok(status) => print_index_status(&session, status),
        Err(e) => println!("[!] {}", e),
    }

    if !session.has_model() {
        print_missing_key_hint();
    }

    let mut suggestions: Vec<String> = if session.memory().is_empty() {
        session
            .sample_questions()
            .iter()
            .map(|q| q.to_string())
            .collect()
    } else {
        println!(
            "[OK] 이전 대화 {} 건을 불러왔습니다. /history 로 확인할 수 있습니다.",
            session.memory().question_count()
        );
        session.followups().await
    };
    print_suggestions("예시 질문", &suggestions);
    println!("\n/help 로 명령어를 확인하세요.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n> ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };

        match parse_repl_input(&line, &suggestions) {
            ReplCommand::Empty => {}
            ReplCommand::Quit => break,
            ReplCommand::Help => print_repl_help(),
            ReplCommand::Ask(question) => match session.ask(&question).await {
                Ok(QueryOutcome::Answered(envelope)) => {
                    print_response(&envelope, show_reasoning);
                    suggestions = session.followups().await;
                    print_suggestions("후속 질문", &suggestions);
                }
                Ok(QueryOutcome::Repeated) => {
                    println!("[!] 이미 답변한 질문입니다. /regen 으로 다시 생성할 수 있습니다.");
                }
                Ok(QueryOutcome::Ignored) => {}
                Err(e) => println!("[!] {}", e),
            },
            ReplCommand::Regenerate => {
                println!("[*] 답변 다시 생성 중...");
                match session.regenerate().await {
                    Ok(envelope) => {
                        print_response(&envelope, show_reasoning);
                        suggestions = session.followups().await;
                        print_suggestions("후속 질문", &suggestions);
                    }
                    Err(e) => println!("[!] {}", e),
                }
            }
            ReplCommand::Feedback(kind, text) => match session.record_feedback(kind, &text) {
                Ok(path) => println!("[OK] 피드백 저장됨: {}", path.display()),
                Err(e) => println!("[!] {}", e),
            },
            ReplCommand::Reasoning => {
                show_reasoning = !show_reasoning;
                println!(
                    "[*] 추론 과정 표시: {}",
                    if show_reasoning { "켜짐" } else { "꺼짐" }
                );
                if show_reasoning {
                    if let Some(envelope) = session.last_response() {
                        print_reasoning(&envelope.reasoning);
                    }
                }
            }
            ReplCommand::History => print_history(&session),
            ReplCommand::Clear => match session.clear() {
                Ok(()) => {
                    println!("[OK] 대화 기록을 삭제했습니다.");
                    suggestions = session
                        .sample_questions()
                        .iter()
                        .map(|q| q.to_string())
                        .collect();
                    print_suggestions("예시 질문", &suggestions);
                }
                Err(e) => println!("[!] {}", e),
            },
            ReplCommand::Depth(None) => {
                println!("[*] 검색 깊이: {}", session.settings().search_depth());
            }
            ReplCommand::Depth(Some(depth)) => {
                let applied = session.set_search_depth(depth);
                println!("[OK] 검색 깊이: {}", applied);
            }
            ReplCommand::Key(key) => match session.set_api_key(&key) {
                Ok(()) => println!("[OK] API 키가 설정되었습니다."),
                Err(e) => println!("[!] {}", e),
            },
            ReplCommand::Invalid(message) => println!("[!] {}", message),
        }
    }

    println!("[*] 세션 종료: {}", session.id());
    Ok(())
}

/// 단일 질문 명령어 (ask)
async fn cmd_ask(
    settings: Settings,
    session_id: Option<String>,
    question: &str,
    show_reasoning: bool,
) -> Result<()> {
    let mut session =
        ResearchSession::from_settings(settings, session_id).context("세션 생성 실패")?;

    if !session.has_model() {
        print_missing_key_hint();
        bail!("API 키가 필요합니다");
    }

    let status = session.initialize().await.context("인덱스 준비 실패")?;
    tracing::debug!("Index status: {:?}", status);

    println!("[*] 질문: \"{}\"", question);

    match session.ask(question).await.context("답변 생성 실패")? {
        QueryOutcome::Answered(envelope) => {
            print_response(&envelope, show_reasoning);
            let followups = session.followups().await;
            print_suggestions("후속 질문", &followups);
        }
        QueryOutcome::Repeated => println!("[!] 이미 답변한 질문입니다."),
        QueryOutcome::Ignored => bail!("질문이 비어 있습니다"),
    }

    println!("\n[*] 세션: {}", session.id());
    Ok(())
}

/// 인덱스 명령어 (index)
///
/// 데이터셋 변경을 확인하고 필요하면 인덱스를 다시 빌드합니다.
async fn cmd_index(settings: Settings, force: bool) -> Result<()> {
    let path = settings.dataset_path.clone();
    let mut retriever = Retriever::from_settings(&settings).context("Retriever 초기화 실패")?;

    println!("[*] 데이터셋: {}", path.display());
    println!("[*] 임베딩 모델: {}", retriever.embedder_name());

    let status = if force {
        println!("[*] 강제 재빌드 중...");
        retriever.force_rebuild(&path).await
    } else {
        println!("[*] 인덱스 확인 중...");
        retriever.ensure(&path).await
    }
    .context("인덱스 빌드 실패")?;

    match status {
        IndexStatus::Reused => println!("[OK] 변경 없음, 기존 인덱스 사용"),
        IndexStatus::LoadedFromCache { chunks } => {
            println!("[OK] 캐시에서 인덱스 복원: {} 청크", chunks)
        }
        IndexStatus::Rebuilt { chunks } => println!("[OK] 인덱스 빌드 완료: {} 청크", chunks),
    }

    if let Some(dataset) = retriever.dataset() {
        println!("     행: {}, 열: {}", dataset.len(), dataset.headers.len());
        println!("     Fingerprint: {}", dataset.fingerprint.short());
    }
    if let Some(index) = retriever.index() {
        println!("     벡터 차원: {}", index.dimension());
    }
    if let Some(cache) = retriever.cache() {
        println!("     캐시: {}", cache.db_path().display());
    }

    Ok(())
}

/// 상태 명령어 (status)
///
/// 시스템 상태를 확인합니다.
fn cmd_status(settings: Settings) -> Result<()> {
    println!("l2gpt v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", settings.data_dir.display());

    // 데이터셋
    let path = &settings.dataset_path;
    match std::fs::metadata(path) {
        Ok(meta) => {
            println!(
                "[OK] 데이터셋: {} ({})",
                path.display(),
                format_bytes(meta.len() as usize)
            );
            match dataset::fingerprint_file(path) {
                Ok(fingerprint) => println!("     Fingerprint: {}", fingerprint.short()),
                Err(e) => println!("[!] Fingerprint 계산 실패: {}", e),
            }
        }
        Err(_) => println!("[!] 데이터셋 없음: {}", path.display()),
    }

    // 인덱스 캐시 (있을 때만 열기)
    let db_path = settings.index_db_path();
    if db_path.exists() {
        match IndexCache::open(&db_path).and_then(|cache| Ok((cache.meta()?, cache))) {
            Ok((Some(meta), cache)) => {
                println!(
                    "[OK] 인덱스 캐시: {} 청크, {}차원 ({})",
                    meta.chunk_count, meta.dimension, meta.embedding_model
                );
                println!("     경로: {}", cache.db_path().display());
                println!(
                    "     Fingerprint: {} | 빌드: {}",
                    meta.fingerprint.short(),
                    meta.built_at.format("%Y-%m-%d %H:%M")
                );
            }
            Ok((None, _)) => println!("[!] 인덱스 캐시: 비어 있음"),
            Err(e) => println!("[!] 인덱스 캐시 열기 실패: {}", e),
        }
    } else {
        println!("[!] 인덱스 캐시: 없음 (l2gpt index 로 생성)");
    }

    // 모델
    println!("[*] 임베딩: {} @ {}", settings.embedding_model, settings.ollama_url);
    println!("[*] 채팅 모델: {}", settings.chat_model);
    println!("[*] 검색 깊이: {}", settings.search_depth());

    // API 키 상태
    if settings.has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export {}=your-key", API_KEY_ENV);
    }

    // 세션
    match SessionStore::from_settings(&settings).list_sessions() {
        Ok(sessions) => println!("[OK] 저장된 세션: {} 개", sessions.len()),
        Err(e) => println!("[!] 세션 목록 조회 실패: {}", e),
    }

    Ok(())
}

/// 대화 기록 명령어 (history)
fn cmd_history(settings: Settings, session_id: Option<String>, html: Option<&Path>) -> Result<()> {
    let session = open_session(settings, session_id)?;

    if session.memory().is_empty() {
        println!("[!] 세션 {} 에 대화 기록이 없습니다.", session.id());
        return Ok(());
    }

    match html {
        Some(path) => {
            let document = render::render_transcript_html(session.id(), session.memory());
            std::fs::write(path, document)
                .with_context(|| format!("Failed to write transcript: {:?}", path))?;
            println!("[OK] HTML로 내보냄: {}", path.display());
        }
        None => print_history(&session),
    }

    Ok(())
}

/// 세션 목록 명령어 (sessions)
fn cmd_sessions(settings: Settings) -> Result<()> {
    let sessions = SessionStore::from_settings(&settings)
        .list_sessions()
        .context("세션 목록 조회 실패")?;

    if sessions.is_empty() {
        println!("[!] 저장된 세션이 없습니다.");
        return Ok(());
    }

    println!("[OK] 저장된 세션 ({} 개):\n", sessions.len());

    for summary in sessions {
        let modified = summary
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<38} {:>3} 질문 | {}",
            summary.id, summary.questions, modified
        );
    }

    Ok(())
}

/// 대화 기록 삭제 명령어 (clear)
fn cmd_clear(settings: Settings, session_id: Option<String>) -> Result<()> {
    let mut session = open_session(settings, session_id)?;
    let questions = session.memory().question_count();

    session.clear().context("대화 기록 삭제 실패")?;
    println!("[OK] 세션 {} 삭제됨 ({} 질문)", session.id(), questions);

    Ok(())
}

/// 피드백 명령어 (feedback)
fn cmd_feedback(
    settings: Settings,
    session_id: Option<String>,
    kind: FeedbackKind,
    text: &str,
    query: Option<&str>,
) -> Result<()> {
    let mut session = ResearchSession::from_settings(settings, session_id)
        .context("세션 생성 실패")?;
    session.load_history();

    let path = session
        .record_feedback_for(kind, text, query)
        .context("피드백 저장 실패")?;

    println!("[OK] {} 피드백 저장됨: {}", kind, path.display());
    Ok(())
}

/// 기존 세션 열기 (대화 기록만 로드, 인덱스는 빌드하지 않음)
fn open_session(settings: Settings, session_id: Option<String>) -> Result<ResearchSession> {
    let Some(id) = session_id else {
        bail!("--session 으로 세션 ID를 지정해야 합니다 (l2gpt sessions 로 목록 확인)");
    };

    let mut session =
        ResearchSession::from_settings(settings, Some(id)).context("세션 열기 실패")?;
    session.load_history();
    Ok(session)
}

// ============================================================================
// REPL Input
// ============================================================================

/// 채팅 모드 입력 해석 결과
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Empty,
    Ask(String),
    Help,
    Regenerate,
    Feedback(FeedbackKind, String),
    Reasoning,
    History,
    Clear,
    Depth(Option<usize>),
    Key(String),
    Quit,
    Invalid(String),
}

/// 입력 한 줄 해석
///
/// 숫자만 입력하면 표시된 제안 질문을 선택합니다.
fn parse_repl_input(line: &str, suggestions: &[String]) -> ReplCommand {
    let input = line.trim();
    if input.is_empty() {
        return ReplCommand::Empty;
    }

    if let Ok(n) = input.parse::<usize>() {
        if (1..=suggestions.len()).contains(&n) {
            return ReplCommand::Ask(suggestions[n - 1].clone());
        }
    }

    let Some(command) = input.strip_prefix('/') else {
        return ReplCommand::Ask(input.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match name {
        "help" | "h" | "?" => ReplCommand::Help,
        "regen" | "regenerate" => ReplCommand::Regenerate,
        "yes" => ReplCommand::Feedback(FeedbackKind::Positive, arg.to_string()),
        "no" => {
            if arg.is_empty() {
                ReplCommand::Invalid("사용법: /no <무엇이 잘못되었는지>".to_string())
            } else {
                ReplCommand::Feedback(FeedbackKind::Negative, arg.to_string())
            }
        }
        "reasoning" => ReplCommand::Reasoning,
        "history" => ReplCommand::History,
        "clear" => ReplCommand::Clear,
        "depth" if arg.is_empty() => ReplCommand::Depth(None),
        "depth" => match arg.parse::<usize>() {
            Ok(depth) => ReplCommand::Depth(Some(depth)),
            Err(_) => ReplCommand::Invalid(format!(
                "사용법: /depth <{}-{}>",
                MIN_SEARCH_DEPTH, MAX_SEARCH_DEPTH
            )),
        },
        "key" if arg.is_empty() => ReplCommand::Invalid("사용법: /key <api-key>".to_string()),
        "key" => ReplCommand::Key(arg.to_string()),
        "quit" | "exit" | "q" => ReplCommand::Quit,
        other => ReplCommand::Invalid(format!("알 수 없는 명령어: /{} (/help 참고)", other)),
    }
}

// ============================================================================
// Output Helpers
// ============================================================================

fn print_repl_help() {
    println!("명령어:");
    println!("  /help              이 도움말");
    println!("  /regen             마지막 답변 다시 생성");
    println!("  /yes [내용]        좋은 답변 피드백");
    println!("  /no <내용>         나쁜 답변 피드백");
    println!("  /reasoning         추론 과정 표시 전환");
    println!("  /history           대화 기록 보기");
    println!("  /clear             대화 기록 삭제");
    println!(
        "  /depth <n>         검색 깊이 ({}-{})",
        MIN_SEARCH_DEPTH, MAX_SEARCH_DEPTH
    );
    println!("  /key <key>         OpenRouter API 키 설정");
    println!("  /quit              종료");
    println!("  <번호>             제안 질문 선택");
}

fn print_missing_key_hint() {
    println!("[!] API 키가 설정되지 않았습니다.");
    println!("    설정: export {}=your-key", API_KEY_ENV);
    println!("    또는 --api-key, 채팅 중에는 /key <key>");
    println!("    API 키 발급: https://openrouter.ai/keys");
}

fn print_index_status(session: &ResearchSession, status: IndexStatus) {
    let rows = session.retriever().dataset().map(|d| d.len()).unwrap_or(0);
    match status {
        IndexStatus::Reused => println!("[OK] 인덱스 준비됨 ({} 행)", rows),
        IndexStatus::LoadedFromCache { chunks } => {
            println!("[OK] 캐시에서 인덱스 복원: {} 행, {} 청크", rows, chunks)
        }
        IndexStatus::Rebuilt { chunks } => {
            println!("[OK] 인덱스 빌드 완료: {} 행, {} 청크", rows, chunks)
        }
    }
}

fn print_suggestions(title: &str, suggestions: &[String]) {
    if suggestions.is_empty() {
        return;
    }

    println!("\n{}:", title);
    for (i, question) in suggestions.iter().enumerate() {
        println!("  {}. {}", i + 1, question);
    }
}

fn print_reasoning(reasoning: &str) {
    if reasoning.trim().is_empty() {
        println!("[!] 추론 과정이 없습니다.");
        return;
    }

    println!("\n[추론 과정]");
    for line in reasoning.lines() {
        println!("  │ {}", line);
    }
}

fn print_response(envelope: &ResponseEnvelope, show_reasoning: bool) {
    if show_reasoning {
        print_reasoning(&envelope.reasoning);
    }

    println!();
    println!("{}", render::render_terminal(&envelope.answer));
    println!();
    println!("{}", render::render_metadata(envelope));
}

fn print_history(session: &ResearchSession) {
    let memory = session.memory();
    if memory.is_empty() {
        println!("[!] 대화 기록이 없습니다.");
        return;
    }

    println!("[OK] 대화 기록 ({} 질문):\n", memory.question_count());

    for (i, turn) in memory.turns().iter().enumerate() {
        println!("{}. Q: {}", i + 1, turn.question.trim());
        match turn.answer {
            Some(ref answer) => println!("   A: {}\n", truncate_text(answer, 300)),
            None => println!("   A: (답변 없음)\n"),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn suggestions() -> Vec<String> {
        vec!["What is Ark?".to_string(), "Is Liquid federated?".to_string()]
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_truncate_unicode() {
        let korean = "안녕하세요 세계";
        let truncated = truncate_text(korean, 5);
        assert_eq!(truncated, "안녕하세요...");
    }

    #[test]
    fn test_parse_question_and_selection() {
        let s = suggestions();
        assert_eq!(
            parse_repl_input("  How does Stacks work?  ", &s),
            ReplCommand::Ask("How does Stacks work?".to_string())
        );
        assert_eq!(
            parse_repl_input("2", &s),
            ReplCommand::Ask("Is Liquid federated?".to_string())
        );
        // 범위 밖 숫자는 그대로 질문
        assert_eq!(parse_repl_input("7", &s), ReplCommand::Ask("7".to_string()));
        assert_eq!(parse_repl_input("   ", &s), ReplCommand::Empty);
    }

    #[test]
    fn test_parse_commands() {
        let s = suggestions();
        assert_eq!(parse_repl_input("/help", &s), ReplCommand::Help);
        assert_eq!(parse_repl_input("/regen", &s), ReplCommand::Regenerate);
        assert_eq!(parse_repl_input("/reasoning", &s), ReplCommand::Reasoning);
        assert_eq!(parse_repl_input("/history", &s), ReplCommand::History);
        assert_eq!(parse_repl_input("/clear", &s), ReplCommand::Clear);
        assert_eq!(parse_repl_input("/quit", &s), ReplCommand::Quit);
        assert_eq!(
            parse_repl_input("/key sk-or-123", &s),
            ReplCommand::Key("sk-or-123".to_string())
        );
    }

    #[test]
    fn test_parse_feedback() {
        let s = suggestions();
        assert_eq!(
            parse_repl_input("/yes", &s),
            ReplCommand::Feedback(FeedbackKind::Positive, String::new())
        );
        assert_eq!(
            parse_repl_input("/no fees are outdated", &s),
            ReplCommand::Feedback(FeedbackKind::Negative, "fees are outdated".to_string())
        );
        assert!(matches!(parse_repl_input("/no", &s), ReplCommand::Invalid(_)));
    }

    #[test]
    fn test_parse_depth() {
        let s = suggestions();
        assert_eq!(parse_repl_input("/depth", &s), ReplCommand::Depth(None));
        assert_eq!(parse_repl_input("/depth 12", &s), ReplCommand::Depth(Some(12)));
        assert!(matches!(parse_repl_input("/depth many", &s), ReplCommand::Invalid(_)));
        assert!(matches!(parse_repl_input("/bogus", &s), ReplCommand::Invalid(_)));
    }

    #[test]
    fn test_cli_defaults_to_chat() {
        let cli = Cli::try_parse_from(["l2gpt"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.show_reasoning);
    }

    #[test]
    fn test_cli_depth_range() {
        assert!(Cli::try_parse_from(["l2gpt", "--depth", "2"]).is_err());
        assert!(Cli::try_parse_from(["l2gpt", "--depth", "16"]).is_err());
        let cli = Cli::try_parse_from(["l2gpt", "--depth", "15"]).unwrap();
        assert_eq!(cli.depth, Some(15));
    }

    #[test]
    fn test_cli_ask_joins_words() {
        let cli = Cli::try_parse_from(["l2gpt", "ask", "What", "is", "Ark?"]).unwrap();
        match cli.command {
            Some(Commands::Ask { question }) => assert_eq!(question.join(" "), "What is Ark?"),
            _ => panic!("expected ask command"),
        }
    }

    #[test]
    fn test_cli_feedback() {
        let cli =
            Cli::try_parse_from(["l2gpt", "feedback", "negative", "--text", "wrong fees"]).unwrap();
        match cli.command {
            Some(Commands::Feedback { kind, text, query }) => {
                assert_eq!(FeedbackKind::from(kind), FeedbackKind::Negative);
                assert_eq!(text, "wrong fees");
                assert!(query.is_none());
            }
            _ => panic!("expected feedback command"),
        }
    }

    #[test]
    fn test_apply_overrides() {
        let cli = Cli::try_parse_from([
            "l2gpt",
            "--dataset",
            "/tmp/l2.csv",
            "--depth",
            "5",
            "--followups",
            "4",
            "--api-key",
            "sk-cli",
            "status",
        ])
        .unwrap();

        let settings = cli.apply(Settings::from_lookup(|_| None));
        assert_eq!(settings.dataset_path, PathBuf::from("/tmp/l2.csv"));
        assert_eq!(settings.search_depth(), 5);
        assert_eq!(settings.followup_count, 4);
        assert_eq!(settings.api_key.as_deref(), Some("sk-cli"));
    }
}
