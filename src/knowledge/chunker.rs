//! Text Chunking Module
//!
//! 재귀적 문자 분할기를 제공합니다.
//! 구분자 우선순위(문단 → 줄 → 쉼표 → 공백)를 따라 적절한 크기의 청크로 나눕니다.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 목표 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 다음 청크로 이어지는 오버랩 크기 (문자 수)
    pub chunk_overlap: usize,
    /// 구분자 우선순위 (앞쪽부터 시도)
    pub separators: Vec<String>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: ["\n\n", "\n", ",", " "]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn split_text(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 재귀적 문자 분할기
///
/// - 텍스트에 존재하는 첫 번째 구분자로 분할 (구분자는 다음 조각 앞에 유지)
/// - 목표 크기까지 조각을 탐욕적으로 병합
/// - 이전 청크의 끝 조각을 최대 `chunk_overlap` 문자만큼 다음 청크로 이월
/// - 여전히 큰 조각은 남은 구분자로 재귀 분할
pub struct RecursiveChunker {
    config: ChunkConfig,
}

impl RecursiveChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성 (1000 / 200)
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // 사용할 구분자 선택
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let pieces = split_keep_separator(text, separator);

        let mut good: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.config.chunk_size {
                good.push(piece);
                continue;
            }

            if !good.is_empty() {
                final_chunks.extend(self.merge_pieces(&good));
                good.clear();
            }

            if remaining.is_empty() {
                final_chunks.push(piece.to_string());
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !good.is_empty() {
            final_chunks.extend(self.merge_pieces(&good));
        }

        final_chunks
    }

    /// 조각 병합 (오버랩 유지)
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > size {
                if total > size {
                    tracing::warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total,
                        size
                    );
                }

                if !current.is_empty() {
                    if let Some(doc) = join_pieces(&current) {
                        docs.push(doc);
                    }

                    // 오버랩 이하가 될 때까지 앞쪽 조각 제거
                    while total > overlap || (total + len > size && total > 0) {
                        match current.pop_front() {
                            Some(front) => total -= char_len(front),
                            None => break,
                        }
                    }
                }
            }

            current.push_back(piece);
            total += len;
        }

        if let Some(doc) = join_pieces(&current) {
            docs.push(doc);
        }

        docs
    }
}

impl Chunker for RecursiveChunker {
    fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        self.split_recursive(text, &self.config.separators)
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Chunk
// ============================================================================

/// 인덱싱 단위 청크
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 전체 청크 목록에서의 순서 (동점 정렬 기준)
    pub index: usize,
    /// 원본 CSV 행 번호
    pub row: usize,
    /// 원본 파일 식별자
    pub source: String,
    pub text: String,
}

/// 데이터셋의 모든 레코드를 청크로 분할
pub fn chunk_records(chunker: &dyn Chunker, dataset: &Dataset) -> Vec<Chunk> {
    let source = dataset.source_id();
    let mut chunks = Vec::new();

    for record in &dataset.records {
        for text in chunker.split_text(&record.to_text()) {
            chunks.push(Chunk {
                index: chunks.len(),
                row: record.row,
                source: source.clone(),
                text,
            });
        }
    }

    tracing::debug!(
        "{} split {} records into {} chunks",
        chunker.name(),
        dataset.len(),
        chunks.len()
    );

    chunks
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 구분자를 다음 조각 앞에 붙인 채로 분할 (빈 조각 제거)
///
/// 빈 구분자는 문자 단위 분할입니다.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        if pos > start {
            pieces.push(&text[start..pos]);
        }
        start = pos;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces.retain(|p| !p.is_empty());
    pieces
}

/// 조각을 이어붙이고 양끝 공백 제거 (비면 None)
fn join_pieces(pieces: &VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(RecursiveChunker::with_defaults())
}

// ============================================================================
// Tests
// ============================================================================
