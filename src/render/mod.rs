//! 렌더링 모듈 - Markdown 답변을 터미널 텍스트/HTML로 변환
//!
//! pulldown-cmark 이벤트를 순회하면서 블록 구조(제목, 목록, 표, 코드, 인용)를
//! 터미널에서 읽기 좋은 평문으로 바꿉니다. HTML 내보내기는 `pulldown_cmark::html`을 사용합니다.

use pulldown_cmark::{Alignment, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::assistant::{ConversationMemory, ResponseEnvelope, Speaker, LINK_DISPLAY_LIMIT};

/// 표와 취소선 활성화
fn markdown_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options
}

// ============================================================================
// Terminal Rendering
// ============================================================================

/// Markdown을 터미널용 평문으로 렌더링
pub fn render_terminal(markdown: &str) -> String {
    let mut writer = TerminalWriter::default();
    for event in Parser::new_ext(markdown, markdown_options()) {
        writer.handle(event);
    }
    writer.finish()
}

#[derive(Debug)]
struct ListState {
    /// 번호 목록이면 다음 번호
    next: Option<u64>,
    /// 현재 항목 본문 들여쓰기 폭
    indent: usize,
}

#[derive(Debug, Default)]
struct TableState {
    alignments: Vec<Alignment>,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
    header_rows: usize,
}

#[derive(Debug, Default)]
struct TerminalWriter {
    out: String,
    line: String,
    lists: Vec<ListState>,
    bullet: Option<String>,
    quote_depth: usize,
    in_code: bool,
    table: Option<TableState>,
    /// (링크 주소, 링크 텍스트 시작 위치)
    links: Vec<(String, usize)>,
}

impl TerminalWriter {
    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if self.in_code {
                    self.code_text(&text);
                } else {
                    self.target().push_str(&text);
                }
            }
            Event::Code(code) => {
                let target = self.target();
                target.push('`');
                target.push_str(&code);
                target.push('`');
            }
            Event::SoftBreak => self.target().push(' '),
            Event::HardBreak => self.flush_line(),
            Event::Rule => {
                self.flush_line();
                self.emit("─".repeat(40));
                self.blank_line();
            }
            Event::TaskListMarker(done) => {
                self.target().push_str(if done { "[x] " } else { "[ ] " });
            }
            Event::Html(html) | Event::InlineHtml(html) => self.target().push_str(&html),
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { .. } | Tag::Paragraph => self.flush_line(),
            Tag::BlockQuote(_) => {
                self.flush_line();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(_) => {
                self.flush_line();
                self.in_code = true;
            }
            Tag::List(start) => {
                self.flush_line();
                self.lists.push(ListState {
                    next: start,
                    indent: 0,
                });
            }
            Tag::Item => {
                self.flush_line();
                let depth = self.lists.len().saturating_sub(1);
                if let Some(list) = self.lists.last_mut() {
                    let marker = match list.next.as_mut() {
                        Some(n) => {
                            let marker = format!("{}.", n);
                            *n += 1;
                            marker
                        }
                        None => "•".to_string(),
                    };
                    let bullet = format!("{}{} ", "  ".repeat(depth), marker);
                    list.indent = bullet.chars().count();
                    self.bullet = Some(bullet);
                }
            }
            Tag::Table(alignments) => {
                self.flush_line();
                self.table = Some(TableState {
                    alignments,
                    ..TableState::default()
                });
            }
            Tag::TableHead | Tag::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    table.row.clear();
                }
            }
            Tag::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    table.cell.clear();
                }
            }
            Tag::Link { dest_url, .. } => {
                let start = self.target().len();
                self.links.push((dest_url.to_string(), start));
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(level) => {
                let title = std::mem::take(&mut self.line);
                let width = title.chars().count();
                self.emit(title);
                let underline = if level == HeadingLevel::H1 { "=" } else { "-" };
                self.emit(underline.repeat(width));
                self.blank_line();
            }
            TagEnd::Paragraph => {
                self.flush_line();
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::BlockQuote(_) => {
                self.flush_line();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.blank_line();
            }
            TagEnd::CodeBlock => {
                self.in_code = false;
                self.blank_line();
            }
            TagEnd::List(_) => {
                self.flush_line();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::Item => self.flush_line(),
            TagEnd::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    let cell = std::mem::take(&mut table.cell);
                    table.row.push(cell.trim().to_string());
                }
            }
            TagEnd::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    let row = std::mem::take(&mut table.row);
                    table.rows.push(row);
                    table.header_rows += 1;
                }
            }
            TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    let row = std::mem::take(&mut table.row);
                    table.rows.push(row);
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    for line in format_table(&table) {
                        self.emit(line);
                    }
                    self.blank_line();
                }
            }
            TagEnd::Link => {
                if let Some((url, start)) = self.links.pop() {
                    let target = self.target();
                    let text = target.get(start..).unwrap_or("").to_string();
                    if !url.is_empty() && text.trim() != url {
                        target.push_str(&format!(" ({})", url));
                    }
                }
            }
            _ => {}
        }
    }

    /// 현재 텍스트가 들어갈 버퍼 (표 셀 또는 현재 줄)
    fn target(&mut self) -> &mut String {
        match self.table.as_mut() {
            Some(table) => &mut table.cell,
            None => &mut self.line,
        }
    }

    fn code_text(&mut self, text: &str) {
        for line in text.lines() {
            self.emit(format!("    {}", line));
        }
    }

    fn prefix(&mut self) -> String {
        let mut prefix = "│ ".repeat(self.quote_depth);
        match self.bullet.take() {
            Some(bullet) => prefix.push_str(&bullet),
            None => {
                if let Some(list) = self.lists.last() {
                    prefix.push_str(&" ".repeat(list.indent));
                }
            }
        }
        prefix
    }

    /// 한 줄 출력 (인용/목록 접두사 포함)
    fn emit(&mut self, text: String) {
        let prefix = self.prefix();
        let line = format!("{}{}", prefix, text);
        self.out.push_str(line.trim_end());
        self.out.push('\n');
    }

    fn flush_line(&mut self) {
        if self.line.trim().is_empty() {
            self.line.clear();
            return;
        }
        let line = std::mem::take(&mut self.line);
        self.emit(line.trim().to_string());
    }

    fn blank_line(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    fn finish(mut self) -> String {
        self.flush_line();
        self.out.trim_end().to_string()
    }
}

/// 표를 열 너비에 맞춰 정렬
fn format_table(table: &TableState) -> Vec<String> {
    let columns = table.rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in &table.rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let format_row = |row: &Vec<String>| -> String {
        (0..columns)
            .map(|i| {
                let cell = row.get(i).map(String::as_str).unwrap_or("");
                let alignment = table.alignments.get(i).copied().unwrap_or(Alignment::None);
                pad(cell, widths[i], alignment)
            })
            .collect::<Vec<_>>()
            .join(" │ ")
    };

    let mut lines = Vec::with_capacity(table.rows.len() + 1);
    for (i, row) in table.rows.iter().enumerate() {
        lines.push(format_row(row));
        if i + 1 == table.header_rows {
            lines.push(
                widths
                    .iter()
                    .map(|w| "─".repeat(*w))
                    .collect::<Vec<_>>()
                    .join("─┼─"),
            );
        }
    }
    lines
}

fn pad(text: &str, width: usize, alignment: Alignment) -> String {
    let fill = width.saturating_sub(text.chars().count());
    match alignment {
        Alignment::Right => format!("{}{}", " ".repeat(fill), text),
        Alignment::Center => {
            let left = fill / 2;
            format!("{}{}{}", " ".repeat(left), text, " ".repeat(fill - left))
        }
        Alignment::Left | Alignment::None => format!("{}{}", text, " ".repeat(fill)),
    }
}

// ============================================================================
// HTML Rendering
// ============================================================================

/// Markdown을 HTML 조각으로 렌더링
pub fn render_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, markdown_options());
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

/// 원시 HTML을 텍스트로 바꿔 이스케이프한 뒤 렌더링 (모델 출력 내보내기용)
fn render_html_untrusted(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, markdown_options()).map(|event| match event {
        Event::Html(html) | Event::InlineHtml(html) => Event::Text(html),
        other => other,
    });
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

/// 대화 기록 전체를 HTML 문서로 내보내기
pub fn render_transcript_html(session_id: &str, memory: &ConversationMemory) -> String {
    let mut body = String::new();
    for entry in memory.all() {
        match entry.speaker {
            Speaker::Human => {
                body.push_str("<section class=\"question\"><h2>");
                body.push_str(&escape_html(&entry.content));
                body.push_str("</h2></section>\n");
            }
            Speaker::Ai => {
                body.push_str("<section class=\"answer\">\n");
                body.push_str(&render_html_untrusted(&entry.content));
                body.push_str("</section>\n");
            }
        }
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Bitcoin L2 Research Assistant - {id}</title>\n</head>\n<body>\n<h1>Session {id}</h1>\n{body}</body>\n</html>\n",
        id = escape_html(session_id),
        body = body
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    // String 쓰기는 실패하지 않음
    let _ = pulldown_cmark_escape::escape_html(&mut escaped, text);
    escaped
}

// ============================================================================
// Metadata
// ============================================================================

/// 응답 메타데이터 표 (처리 시간, 출처 수, L2 프로젝트, 참고 링크)
pub fn render_metadata(envelope: &ResponseEnvelope) -> String {
    let projects = if envelope.citations.projects.is_empty() {
        "None referenced".to_string()
    } else {
        envelope.citations.projects.join(", ")
    };

    let links = envelope
        .citations
        .link_summary(LINK_DISPLAY_LIMIT)
        .unwrap_or_else(|| "None found".to_string());

    let rows = [
        (
            "Processing time",
            format!("{:.2}s", envelope.processing_time.as_secs_f64()),
        ),
        ("Sources analysed", envelope.sources_count().to_string()),
        ("L2 projects", projects),
        ("Reference links", links),
    ];

    let mut out = String::from("Response Metadata\n");
    for (label, value) in rows {
        out.push_str(&format!("  {:<18} {}\n", label, value));
    }
    out.trim_end().to_string()
}

// ============================================================================
// Tests
// ============================================================================
