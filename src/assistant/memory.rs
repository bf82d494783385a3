//! 대화 메모리 - 질문/답변 순서 로그

use serde::{Deserialize, Serialize};

/// 발화자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Human,
    Ai,
}

/// 메모리 엔트리 (`{"type": "human", "content": "..."}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    #[serde(rename = "type")]
    pub speaker: Speaker,
    pub content: String,
}

/// 질문/답변 한 쌍
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub answer: Option<String>,
}

/// 대화 메모리
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    entries: Vec<MemoryEntry>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 엔트리로 복원
    pub fn restore(entries: Vec<MemoryEntry>) -> Self {
        Self { entries }
    }

    pub fn add_question(&mut self, question: impl Into<String>) {
        self.entries.push(MemoryEntry {
            speaker: Speaker::Human,
            content: question.into(),
        });
    }

    pub fn add_answer(&mut self, answer: impl Into<String>) {
        self.entries.push(MemoryEntry {
            speaker: Speaker::Ai,
            content: answer.into(),
        });
    }

    pub fn all(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 질문 단위로 묶은 대화 (답변 없는 질문도 포함)
    pub fn turns(&self) -> Vec<Turn> {
        let mut turns: Vec<Turn> = Vec::new();
        for entry in &self.entries {
            match entry.speaker {
                Speaker::Human => turns.push(Turn {
                    question: entry.content.clone(),
                    answer: None,
                }),
                Speaker::Ai => match turns.last_mut() {
                    Some(turn) if turn.answer.is_none() => {
                        turn.answer = Some(entry.content.clone());
                    }
                    // 질문 없는 답변은 건너뜀
                    _ => {}
                },
            }
        }
        turns
    }

    /// 질문 개수
    pub fn question_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.speaker == Speaker::Human)
            .count()
    }

    pub fn last_question(&self) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.speaker == Speaker::Human)
            .map(|e| e.content.as_str())
    }

    /// 마지막 질문과 그 뒤의 답변 제거
    ///
    /// 제거된 엔트리를 순서대로 반환합니다 (복원용).
    pub fn pop_last_turn(&mut self) -> Option<Vec<MemoryEntry>> {
        let start = self
            .entries
            .iter()
            .rposition(|e| e.speaker == Speaker::Human)?;
        Some(self.entries.split_off(start))
    }

    /// pop_last_turn으로 제거한 엔트리 되돌리기
    pub fn push_entries(&mut self, entries: Vec<MemoryEntry>) {
        self.entries.extend(entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConversationMemory {
        let mut memory = ConversationMemory::new();
        memory.add_question("What is Lightning?");
        memory.add_answer("A payment channel network.");
        memory.add_question("And Liquid?");
        memory.add_answer("A federated sidechain.");
        memory
    }

    #[test]
    fn test_order_preserved() {
        let memory = sample();
        let speakers: Vec<Speaker> = memory.all().iter().map(|e| e.speaker).collect();
        assert_eq!(
            speakers,
            vec![Speaker::Human, Speaker::Ai, Speaker::Human, Speaker::Ai]
        );
        assert_eq!(memory.question_count(), 2);
    }

    #[test]
    fn test_turns() {
        let mut memory = sample();
        memory.add_question("Pending?");

        let turns = memory.turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].answer.as_deref(), Some("A federated sidechain."));
        assert_eq!(turns[2].answer, None);
    }

    #[test]
    fn test_last_question() {
        let memory = sample();
        assert_eq!(memory.last_question(), Some("And Liquid?"));
        assert_eq!(ConversationMemory::new().last_question(), None);
    }

    #[test]
    fn test_pop_last_turn_and_restore() {
        let mut memory = sample();
        let removed = memory.pop_last_turn().unwrap();

        assert_eq!(removed.len(), 2);
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.last_question(), Some("What is Lightning?"));

        memory.push_entries(removed);
        assert_eq!(memory.all(), sample().all());
    }

    #[test]
    fn test_pop_on_empty() {
        let mut memory = ConversationMemory::new();
        assert!(memory.pop_last_turn().is_none());
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = MemoryEntry {
            speaker: Speaker::Ai,
            content: "hi".to_string(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"type":"ai","content":"hi"}"#);

        let back: MemoryEntry = serde_json::from_str(r#"{"type":"human","content":"q"}"#).unwrap();
        assert_eq!(back.speaker, Speaker::Human);
    }

    #[test]
    fn test_clear() {
        let mut memory = sample();
        memory.clear();
        assert!(memory.is_empty());
        assert!(memory.turns().is_empty());
    }
}
