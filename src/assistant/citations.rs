//! 인용 추출 - 검색 결과에서 링크, L2 프로젝트, 출처 추출

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::knowledge::ScoredChunk;

/// 인식하는 비트코인 L2 프로젝트 이름
pub const L2_PROJECTS: &[&str] = &[
    "Lightning",
    "Liquid",
    "Rootstock",
    "RSK",
    "Stacks",
    "Ark",
    "Tachi",
    "Bitlayer",
    "BitcoinOS",
    "Babylon",
    "Merlin",
    "CoreDAO",
    "Arch",
];

/// 링크 요약에 표시할 최대 도메인 수
pub const LINK_DISPLAY_LIMIT: usize = 3;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"http[s]?://(?:[a-zA-Z]|[0-9]|[$-_@.&+]|[!*\(\),]|(?:%[0-9a-fA-F][0-9a-fA-F]))+")
        .expect("URL pattern is valid")
});

/// 추출된 인용 정보
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Citations {
    /// 처음 등장한 순서, 중복 제거
    pub links: Vec<String>,
    /// 이름순 정렬
    pub projects: Vec<String>,
    pub sources: Vec<String>,
}

impl Citations {
    /// 도메인 요약 (`a.org, b.net, c.io and 2 more`)
    ///
    /// 링크가 없으면 None
    pub fn link_summary(&self, limit: usize) -> Option<String> {
        if self.links.is_empty() {
            return None;
        }

        let shown: Vec<String> = self
            .links
            .iter()
            .take(limit)
            .map(|link| link_domain(link))
            .collect();

        let mut summary = shown.join(", ");
        if self.links.len() > limit {
            summary.push_str(&format!(" and {} more", self.links.len() - limit));
        }
        Some(summary)
    }
}

/// 검색 결과에서 인용 추출
pub fn extract_citations(chunks: &[ScoredChunk]) -> Citations {
    let mut citations = Citations::default();
    let mut projects = BTreeSet::new();

    for scored in chunks {
        let text = &scored.chunk.text;

        for m in URL_RE.find_iter(text) {
            let link = m.as_str().trim_end_matches(['.', ',', ';', ':', ')']);
            if !link.is_empty() && !citations.links.iter().any(|l| l == link) {
                citations.links.push(link.to_string());
            }
        }

        let lower = text.to_lowercase();
        for project in L2_PROJECTS {
            if lower.contains(&project.to_lowercase()) {
                projects.insert(project.to_string());
            }
        }

        if !citations.sources.contains(&scored.chunk.source) {
            citations.sources.push(scored.chunk.source.clone());
        }
    }

    citations.projects = projects.into_iter().collect();
    citations
}

/// URL의 호스트 (파싱 실패 시 원문)
fn link_domain(link: &str) -> String {
    url::Url::parse(link)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| link.to_string())
}
