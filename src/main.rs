//! l2gpt CLI 진입점

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    // 로깅 초기화 (답변 출력과 섞이지 않도록 stderr)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // CLI 실행
    let cli = l2gpt::cli::Cli::parse();

    // 한 번에 질의 하나만 처리
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(l2gpt::cli::run(cli))
}
