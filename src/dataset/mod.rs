//! 데이터셋 모듈 - CSV 로드 및 변경 감지
//!
//! CSV 파일의 각 행을 `column: value` 형태의 텍스트 레코드로 변환하고,
//! 파일 내용의 SHA-256 해시(fingerprint)로 변경 여부를 판단합니다.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AssistantError, Result};

/// 해시 계산 시 읽기 버퍼 크기
const READ_BLOCK_SIZE: usize = 4096;

// ============================================================================
// Types
// ============================================================================

/// 데이터셋 내용 해시 (hex)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 로그 출력용 짧은 형태 (문자 경계가 아니면 전체)
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }

    fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// CSV 한 행
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// 0부터 시작하는 행 번호 (헤더 제외)
    pub row: usize,
    /// (컬럼명, 값) 순서 보존
    pub fields: Vec<(String, String)>,
}

impl SourceRecord {
    /// 인덱싱용 텍스트 (`column: value` 줄 단위)
    pub fn to_text(&self) -> String {
        self.fields
            .iter()
            .map(|(column, value)| format!("{}: {}", column.trim(), value.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 컬럼 값 조회
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| c.trim() == column)
            .map(|(_, v)| v.as_str())
    }
}

/// 로드된 데이터셋
#[derive(Debug, Clone)]
pub struct Dataset {
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    pub headers: Vec<String>,
    pub records: Vec<SourceRecord>,
}

impl Dataset {
    /// 청크 메타데이터에 들어갈 소스 식별자
    pub fn source_id(&self) -> String {
        self.path.display().to_string()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Loading
// ============================================================================

/// 파일 내용 해시 계산 (4 KiB 단위 스트리밍)
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint> {
    let mut file = File::open(path).map_err(|e| AssistantError::load(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_BLOCK_SIZE];

    loop {
        let n = file.read(&mut buf).map_err(|e| AssistantError::load(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(Fingerprint(format!("{:x}", hasher.finalize())))
}

/// CSV 데이터셋 로드
///
/// 파일이 없거나 UTF-8/CSV 파싱에 실패하면 `Load` 에러를 반환합니다.
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let bytes = std::fs::read(path).map_err(|e| AssistantError::load(path, e))?;
    let fingerprint = Fingerprint::of_bytes(&bytes);

    let (headers, records) = parse_records(&bytes).map_err(|e| AssistantError::load(path, e))?;

    tracing::info!(
        "Loaded dataset {:?}: {} rows, {} columns (fingerprint {})",
        path,
        records.len(),
        headers.len(),
        fingerprint.short()
    );

    Ok(Dataset {
        path: path.to_path_buf(),
        fingerprint,
        headers,
        records,
    })
}

/// CSV 바이트를 레코드로 파싱
///
/// 헤더보다 셀이 적은 행은 빈 값으로 채웁니다.
fn parse_records(bytes: &[u8]) -> std::result::Result<(Vec<String>, Vec<SourceRecord>), String> {
    if std::str::from_utf8(bytes).is_err() {
        return Err("dataset is not valid UTF-8".to_string());
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| format!("failed to read header row: {}", e))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err("dataset has no header row".to_string());
    }

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(|e| format!("row {}: {}", row + 1, e))?;

        let fields = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header.clone(), record.get(i).unwrap_or("").to_string()))
            .collect();

        records.push(SourceRecord { row, fields });
    }

    Ok((headers, records))
}

// ============================================================================
// Change Detection
// ============================================================================

/// 변경 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    /// 이전 fingerprint 없음 (최초 빌드)
    Initial,
    Unchanged,
    Changed,
}

impl ChangeStatus {
    pub fn requires_rebuild(self) -> bool {
        !matches!(self, ChangeStatus::Unchanged)
    }
}

/// 마지막 fingerprint와 현재 fingerprint 비교
pub fn detect_change(last: Option<&Fingerprint>, current: &Fingerprint) -> ChangeStatus {
    match last {
        None => ChangeStatus::Initial,
        Some(last) if last == current => ChangeStatus::Unchanged,
        Some(_) => ChangeStatus::Changed,
    }
}

/// 재빌드 필요 여부 (해시 불일치 시 무조건 전체 재빌드)
pub fn requires_rebuild(last: Option<&Fingerprint>, current: &Fingerprint) -> bool {
    detect_change(last, current).requires_rebuild()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE_CSV: &str = "Name,Category,Website\n\
        Lightning Network,Payment Channel,https://lightning.network\n\
        Liquid Network,Sidechain,https://liquid.net\n";

    fn write_csv(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_dataset() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "data.csv", SAMPLE_CSV);

        let dataset = load_dataset(&path).unwrap();
        assert_eq!(dataset.headers, vec!["Name", "Category", "Website"]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.records[1].row, 1);
        assert_eq!(dataset.records[1].get("Name"), Some("Liquid Network"));
    }

    #[test]
    fn test_record_text_format() {
        let record = SourceRecord {
            row: 0,
            fields: vec![
                ("Name".to_string(), " Stacks ".to_string()),
                ("TVL".to_string(), "$120M".to_string()),
            ],
        };
        assert_eq!(record.to_text(), "Name: Stacks\nTVL: $120M");
    }

    #[test]
    fn test_short_rows_are_padded() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "short.csv", "A,B,C\n1,2\n");

        let dataset = load_dataset(&path).unwrap();
        assert_eq!(dataset.records[0].get("C"), Some(""));
    }

    #[test]
    fn test_header_only_dataset_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "empty.csv", "Name,Category\n");

        let dataset = load_dataset(&path).unwrap();
        assert!(dataset.is_empty());
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let result = load_dataset(Path::new("/nonexistent/data.csv"));
        assert!(matches!(result, Err(AssistantError::Load { .. })));

        let result = fingerprint_file(Path::new("/nonexistent/data.csv"));
        assert!(matches!(result, Err(AssistantError::Load { .. })));
    }

    #[test]
    fn test_invalid_utf8_is_load_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("binary.csv");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x41]).unwrap();

        let result = load_dataset(&path);
        assert!(matches!(result, Err(AssistantError::Load { .. })));
    }

    #[test]
    fn test_fingerprint_matches_loaded_dataset() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "data.csv", SAMPLE_CSV);

        let streamed = fingerprint_file(&path).unwrap();
        let loaded = load_dataset(&path).unwrap();
        assert_eq!(streamed, loaded.fingerprint);
        assert_eq!(streamed.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "data.csv", SAMPLE_CSV);
        let before = fingerprint_file(&path).unwrap();

        std::fs::write(&path, format!("{}Ark,Virtual UTXO,https://ark.io\n", SAMPLE_CSV)).unwrap();
        let after = fingerprint_file(&path).unwrap();

        assert_ne!(before, after);
        assert!(requires_rebuild(Some(&before), &after));
    }

    #[test]
    fn test_detect_change() {
        let a = Fingerprint::from_hex("aaaa");
        let b = Fingerprint::from_hex("bbbb");

        assert_eq!(detect_change(None, &a), ChangeStatus::Initial);
        assert_eq!(detect_change(Some(&a), &a), ChangeStatus::Unchanged);
        assert_eq!(detect_change(Some(&a), &b), ChangeStatus::Changed);

        assert!(requires_rebuild(None, &a));
        assert!(!requires_rebuild(Some(&a), &a));
    }

    #[test]
    fn test_short_fingerprint() {
        let hex = Fingerprint::from_hex("0123456789abcdef");
        assert_eq!(hex.short(), "0123456789ab");
        assert_eq!(Fingerprint::from_hex("abc").short(), "abc");

        // 12바이트 위치가 문자 경계가 아니면 전체 반환
        let korean = Fingerprint::from_hex("a가나다라");
        assert_eq!(korean.short(), "a가나다라");
    }
}
