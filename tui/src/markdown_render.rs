use crate::render::highlight::highlight_code_to_lines;
use chatline_core::error::RenderError;
use pulldown_cmark::Alignment;
use pulldown_cmark::CodeBlockKind;
use pulldown_cmark::CowStr;
use pulldown_cmark::Event;
use pulldown_cmark::HeadingLevel;
use pulldown_cmark::Options;
use pulldown_cmark::Parser;
use pulldown_cmark::Tag;
use pulldown_cmark::TagEnd;
use ratatui::style::Style;
use ratatui::style::Stylize;
use ratatui::text::Line;
use ratatui::text::Span;
use unicode_width::UnicodeWidthStr;

/// Inputs beyond this size are refused rather than parsed; callers fall back
/// to plain text.
const MAX_MARKDOWN_BYTES: usize = 512 * 1024;
const MIN_TABLE_COLUMN_WIDTH: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CodeBlock {
    pub(crate) language: Option<String>,
    pub(crate) code: String,
}

#[derive(Debug, Default)]
pub(crate) struct RenderedMarkdown {
    pub(crate) lines: Vec<Line<'static>>,
    pub(crate) code_blocks: Vec<CodeBlock>,
}

pub(crate) fn render_markdown_text(input: &str) -> Result<RenderedMarkdown, RenderError> {
    if input.len() > MAX_MARKDOWN_BYTES {
        return Err(RenderError(format!(
            "{} bytes exceeds the {MAX_MARKDOWN_BYTES} byte limit",
            input.len()
        )));
    }

    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    let parser = Parser::new_ext(input, options);
    let mut writer = Writer::new(parser);
    writer.run();
    Ok(RenderedMarkdown {
        lines: writer.lines,
        code_blocks: writer.code_blocks,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IndentKind {
    List,
    Quote,
    Code,
}

#[derive(Clone, Debug)]
struct IndentContext {
    prefix: Vec<Span<'static>>,
    marker: Option<Vec<Span<'static>>>,
    kind: IndentKind,
}

impl IndentContext {
    fn new(prefix: Vec<Span<'static>>, marker: Option<Vec<Span<'static>>>, kind: IndentKind) -> Self {
        Self {
            prefix,
            marker,
            kind,
        }
    }
}

struct PendingCode {
    language: Option<String>,
    indented: bool,
    source: String,
}

struct PendingLink {
    dest: String,
    text: String,
}

#[derive(Default)]
struct TableState {
    alignments: Vec<Alignment>,
    rows: Vec<Vec<Vec<Span<'static>>>>,
    header_rows: usize,
    row: Vec<Vec<Span<'static>>>,
    cell: Vec<Span<'static>>,
}

impl TableState {
    fn new(alignments: Vec<Alignment>) -> Self {
        Self {
            alignments,
            ..Self::default()
        }
    }

    fn end_cell(&mut self) {
        self.row.push(std::mem::take(&mut self.cell));
    }

    fn end_row(&mut self) {
        self.rows.push(std::mem::take(&mut self.row));
    }

    fn end_head(&mut self) {
        self.end_row();
        self.header_rows = self.rows.len();
    }

    fn render(self) -> Vec<Line<'static>> {
        let columns = self
            .rows
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(self.alignments.len());
        if columns == 0 {
            return Vec::new();
        }

        let mut widths = vec![MIN_TABLE_COLUMN_WIDTH; columns];
        for row in &self.rows {
            for (column, cell) in row.iter().enumerate() {
                widths[column] = widths[column].max(cell_width(cell));
            }
        }

        let mut lines = Vec::with_capacity(self.rows.len() + 3);
        lines.push(border(&widths, '┌', '┬', '┐'));
        for (index, row) in self.rows.into_iter().enumerate() {
            let is_header = index < self.header_rows;
            let mut spans: Vec<Span<'static>> = vec![Span::from("│")];
            let mut cells = row.into_iter();
            for (column, width) in widths.iter().enumerate() {
                let cell = cells.next().unwrap_or_default();
                let padding = width.saturating_sub(cell_width(&cell));
                let alignment = self
                    .alignments
                    .get(column)
                    .copied()
                    .unwrap_or(Alignment::None);
                let (left, right) = match alignment {
                    Alignment::Right => (padding, 0),
                    Alignment::Center => (padding / 2, padding - padding / 2),
                    Alignment::Left | Alignment::None => (0, padding),
                };
                spans.push(Span::from(format!(" {}", " ".repeat(left))));
                for span in cell {
                    spans.push(if is_header { span.bold() } else { span });
                }
                spans.push(Span::from(format!("{} │", " ".repeat(right))));
            }
            lines.push(Line::from(spans));
            if is_header && index + 1 == self.header_rows {
                lines.push(border(&widths, '├', '┼', '┤'));
            }
        }
        lines.push(border(&widths, '└', '┴', '┘'));
        lines
    }
}

fn cell_width(cell: &[Span<'static>]) -> usize {
    cell.iter().map(|span| span.content.width()).sum()
}

fn border(widths: &[usize], left: char, mid: char, right: char) -> Line<'static> {
    let segments = widths
        .iter()
        .map(|width| "─".repeat(width + 2))
        .collect::<Vec<_>>();
    Line::from(format!("{left}{}{right}", segments.join(&mid.to_string()))).dim()
}

struct Writer<'a, I>
where
    I: Iterator<Item = Event<'a>>,
{
    iter: I,
    lines: Vec<Line<'static>>,
    code_blocks: Vec<CodeBlock>,
    inline_styles: Vec<Style>,
    indent_stack: Vec<IndentContext>,
    list_indices: Vec<Option<u64>>,
    link: Option<PendingLink>,
    code_block: Option<PendingCode>,
    table: Option<TableState>,
    needs_newline: bool,
    pending_marker_line: bool,
    current_line: Option<Line<'static>>,
    current_prefix: Vec<Span<'static>>,
    current_style: Style,
}

impl<'a, I> Writer<'a, I>
where
    I: Iterator<Item = Event<'a>>,
{
    fn new(iter: I) -> Self {
        Self {
            iter,
            lines: Vec::new(),
            code_blocks: Vec::new(),
            inline_styles: Vec::new(),
            indent_stack: Vec::new(),
            list_indices: Vec::new(),
            link: None,
            code_block: None,
            table: None,
            needs_newline: false,
            pending_marker_line: false,
            current_line: None,
            current_prefix: Vec::new(),
            current_style: Style::default(),
        }
    }

    fn run(&mut self) {
        while let Some(event) = self.iter.next() {
            self.handle_event(event);
        }
        // Unterminated fences still surface their contents.
        if self.code_block.is_some() {
            self.end_codeblock();
        }
        if self.table.is_some() {
            self.end_table();
        }
        self.flush_current_line();
    }

    fn handle_event(&mut self, event: Event<'a>) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.text(text),
            Event::Code(code) => self.code(code),
            Event::SoftBreak | Event::HardBreak => self.line_break(),
            Event::Rule => self.rule(),
            Event::Html(html) => self.html(html, false),
            Event::InlineHtml(html) => self.html(html, true),
            Event::TaskListMarker(checked) => self.task_marker(checked),
            Event::FootnoteReference(label) => {
                self.push_span(format!("[^{label}]").dim());
            }
        }
    }

    fn start_tag(&mut self, tag: Tag<'a>) {
        match tag {
            Tag::Paragraph => self.start_paragraph(),
            Tag::Heading { level, .. } => self.start_heading(level),
            Tag::BlockQuote => self.start_blockquote(),
            Tag::CodeBlock(kind) => self.start_codeblock(kind),
            Tag::List(start) => self.start_list(start),
            Tag::Item => self.start_item(),
            Tag::Emphasis => self.push_inline_style(Style::new().italic()),
            Tag::Strong => self.push_inline_style(Style::new().bold()),
            Tag::Strikethrough => self.push_inline_style(Style::new().crossed_out()),
            Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. } => {
                self.link = Some(PendingLink {
                    dest: dest_url.to_string(),
                    text: String::new(),
                });
            }
            Tag::Table(alignments) => self.start_table(alignments),
            Tag::TableHead | Tag::TableRow | Tag::TableCell => {}
            Tag::HtmlBlock | Tag::FootnoteDefinition(_) | Tag::MetadataBlock(_) => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.needs_newline = true;
                self.pending_marker_line = false;
            }
            TagEnd::Heading(_) => {
                self.needs_newline = true;
                self.pop_inline_style();
            }
            TagEnd::BlockQuote => {
                self.indent_stack.pop();
                self.needs_newline = true;
            }
            TagEnd::CodeBlock => self.end_codeblock(),
            TagEnd::List(_) => {
                self.list_indices.pop();
                self.needs_newline = true;
            }
            TagEnd::Item => {
                self.indent_stack.pop();
                self.pending_marker_line = false;
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => self.pop_inline_style(),
            TagEnd::Link | TagEnd::Image => self.pop_link(),
            TagEnd::Table => self.end_table(),
            TagEnd::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.end_head();
                }
            }
            TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    table.end_row();
                }
            }
            TagEnd::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    table.end_cell();
                }
            }
            TagEnd::HtmlBlock | TagEnd::FootnoteDefinition | TagEnd::MetadataBlock(_) => {}
        }
    }

    fn start_paragraph(&mut self) {
        if self.needs_newline {
            self.push_blank_line();
        }
        self.push_line(Line::default());
        self.needs_newline = false;
    }

    fn start_heading(&mut self, level: HeadingLevel) {
        if self.needs_newline {
            self.push_blank_line();
            self.needs_newline = false;
        }
        let style = match level {
            HeadingLevel::H1 => Style::new().bold().underlined(),
            HeadingLevel::H2 => Style::new().bold(),
            HeadingLevel::H3 => Style::new().bold().italic(),
            HeadingLevel::H4 | HeadingLevel::H5 | HeadingLevel::H6 => Style::new().italic(),
        };
        let marker = format!("{} ", "#".repeat(level as usize));
        self.push_line(Line::from(vec![Span::styled(marker, style)]));
        self.push_inline_style(style);
    }

    fn start_blockquote(&mut self) {
        if self.needs_newline {
            self.push_blank_line();
            self.needs_newline = false;
        }
        self.indent_stack.push(IndentContext::new(
            vec![Span::from("> ")],
            None,
            IndentKind::Quote,
        ));
    }

    fn start_list(&mut self, index: Option<u64>) {
        if self.list_indices.is_empty() && self.needs_newline {
            self.push_blank_line();
            self.needs_newline = false;
        }
        self.list_indices.push(index);
    }

    fn start_item(&mut self) {
        self.pending_marker_line = true;
        let depth = self.list_indices.len().max(1);
        let width = depth * 4 - 3;
        let is_ordered = self
            .list_indices
            .last()
            .is_some_and(|index| index.is_some());
        let marker = self.list_indices.last_mut().map(|index| match index {
            None => vec![Span::from(" ".repeat(width - 1) + "- ")],
            Some(next) => {
                *next += 1;
                vec![format!("{:width$}. ", *next - 1).light_blue()]
            }
        });
        let indent_len = if is_ordered { width + 2 } else { width + 1 };
        self.indent_stack.push(IndentContext::new(
            vec![Span::from(" ".repeat(indent_len))],
            marker,
            IndentKind::List,
        ));
        self.needs_newline = false;
    }

    fn start_codeblock(&mut self, kind: CodeBlockKind<'a>) {
        self.flush_current_line();
        if !self.lines.is_empty() {
            self.push_blank_line();
        }
        let (language, indented) = match kind {
            CodeBlockKind::Fenced(info) => {
                let language = info
                    .split_whitespace()
                    .next()
                    .map(str::to_string)
                    .filter(|lang| !lang.is_empty());
                (language, false)
            }
            CodeBlockKind::Indented => (None, true),
        };
        self.code_block = Some(PendingCode {
            language,
            indented,
            source: String::new(),
        });
        self.pending_marker_line = false;
        self.needs_newline = false;
    }

    fn end_codeblock(&mut self) {
        let Some(pending) = self.code_block.take() else {
            return;
        };
        let code = pending.source.trim_end_matches('\n').to_string();

        if !pending.indented {
            let label = pending.language.clone().unwrap_or_else(|| "code".to_string());
            self.push_line(Line::from(vec!["▍".dim(), Span::from(" "), label.magenta()]));
        }

        let indent = if pending.indented { "    " } else { "" };
        self.indent_stack.push(IndentContext::new(
            vec![Span::from(indent)],
            None,
            IndentKind::Code,
        ));
        for line in highlight_code_to_lines(&code, pending.language.as_deref()) {
            self.push_line(line);
        }
        self.indent_stack.pop();
        self.flush_current_line();

        self.code_blocks.push(CodeBlock {
            language: pending.language,
            code,
        });
        self.needs_newline = true;
    }

    fn start_table(&mut self, alignments: Vec<Alignment>) {
        self.flush_current_line();
        if self.needs_newline {
            self.push_blank_line();
            self.needs_newline = false;
        }
        self.table = Some(TableState::new(alignments));
    }

    fn end_table(&mut self) {
        let Some(table) = self.table.take() else {
            return;
        };
        for line in table.render() {
            self.push_line(line);
        }
        self.flush_current_line();
        self.needs_newline = true;
    }

    fn text(&mut self, text: CowStr<'a>) {
        if let Some(code) = self.code_block.as_mut() {
            code.source.push_str(&text);
            return;
        }
        if let Some(link) = self.link.as_mut() {
            link.text.push_str(&text);
        }
        let style = self.inline_style();
        if self.table.is_some() {
            self.push_span(Span::styled(text.into_string(), style));
            return;
        }

        if self.pending_marker_line {
            self.push_line(Line::default());
        }
        for (i, line) in text.lines().enumerate() {
            if self.needs_newline {
                self.push_line(Line::default());
                self.needs_newline = false;
            }
            if i > 0 {
                self.push_line(Line::default());
            }
            self.push_span(Span::styled(line.to_string(), style));
        }
        self.needs_newline = false;
    }

    fn code(&mut self, code: CowStr<'a>) {
        if let Some(link) = self.link.as_mut() {
            link.text.push_str(&code);
        }
        if self.pending_marker_line && self.table.is_none() {
            self.push_line(Line::default());
        }
        self.push_span(Span::from(code.into_string()).cyan());
    }

    fn html(&mut self, html: CowStr<'a>, inline: bool) {
        if self.table.is_some() {
            self.push_span(Span::from(html.into_string()));
            return;
        }
        self.pending_marker_line = false;
        let style = self.inline_style();
        for (i, line) in html.lines().enumerate() {
            if self.needs_newline {
                self.push_line(Line::default());
                self.needs_newline = false;
            }
            if i > 0 {
                self.push_line(Line::default());
            }
            self.push_span(Span::styled(line.to_string(), style));
        }
        self.needs_newline = !inline;
    }

    /// Single newlines inside a paragraph are kept as line breaks.
    fn line_break(&mut self) {
        if self.table.is_some() {
            self.push_span(Span::from(" "));
        } else {
            self.push_line(Line::default());
        }
    }

    fn rule(&mut self) {
        self.flush_current_line();
        if !self.lines.is_empty() {
            self.push_blank_line();
        }
        self.push_line(Line::from("———").dim());
        self.needs_newline = true;
    }

    fn task_marker(&mut self, checked: bool) {
        if self.pending_marker_line {
            self.push_line(Line::default());
        }
        let marker = if checked {
            "[x] ".green()
        } else {
            Span::from("[ ] ")
        };
        self.push_span(marker);
    }

    fn inline_style(&self) -> Style {
        self.inline_styles.last().copied().unwrap_or_default()
    }

    fn push_inline_style(&mut self, style: Style) {
        let merged = self.inline_style().patch(style);
        self.inline_styles.push(merged);
    }

    fn pop_inline_style(&mut self) {
        self.inline_styles.pop();
    }

    fn pop_link(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        if link.dest.is_empty() || link.dest == link.text {
            return;
        }
        self.push_span(Span::from(" ("));
        self.push_span(link.dest.cyan().underlined());
        self.push_span(Span::from(")"));
    }

    fn flush_current_line(&mut self) {
        if let Some(mut line) = self.current_line.take() {
            let mut spans = std::mem::take(&mut self.current_prefix);
            spans.append(&mut line.spans);
            self.lines.push(Line::from(spans).style(self.current_style));
        }
    }

    fn push_line(&mut self, line: Line<'static>) {
        self.flush_current_line();
        let in_quote = self
            .indent_stack
            .iter()
            .any(|ctx| ctx.kind == IndentKind::Quote);
        self.current_style = if in_quote {
            Style::new().green()
        } else {
            line.style
        };
        self.current_prefix = self.prefix_spans(self.pending_marker_line);
        self.current_line = Some(line);
        self.pending_marker_line = false;
    }

    fn push_span(&mut self, span: Span<'static>) {
        if let Some(table) = self.table.as_mut() {
            table.cell.push(span);
            return;
        }
        if let Some(line) = self.current_line.as_mut() {
            line.push_span(span);
        } else {
            self.push_line(Line::from(vec![span]));
        }
    }

    fn push_blank_line(&mut self) {
        self.flush_current_line();
        if self
            .indent_stack
            .iter()
            .all(|ctx| ctx.kind == IndentKind::List)
        {
            self.lines.push(Line::default());
        } else {
            self.push_line(Line::default());
            self.flush_current_line();
        }
    }

    /// Builds the indentation for a new line. A line that opens a list item
    /// carries the innermost marker in place of that item's indent.
    fn prefix_spans(&self, pending_marker_line: bool) -> Vec<Span<'static>> {
        let mut prefix: Vec<Span<'static>> = Vec::new();
        let last_marker_index = if pending_marker_line {
            self.indent_stack
                .iter()
                .rposition(|ctx| ctx.marker.is_some())
        } else {
            None
        };
        let last_list_index = self
            .indent_stack
            .iter()
            .rposition(|ctx| ctx.kind == IndentKind::List);

        for (i, ctx) in self.indent_stack.iter().enumerate() {
            let is_list = ctx.kind == IndentKind::List;
            if pending_marker_line {
                if Some(i) == last_marker_index
                    && let Some(marker) = &ctx.marker
                {
                    prefix.extend(marker.iter().cloned());
                    continue;
                }
                if is_list && last_marker_index.is_some_and(|idx| idx > i) {
                    continue;
                }
            } else if is_list && Some(i) != last_list_index {
                continue;
            }
            prefix.extend(ctx.prefix.iter().cloned());
        }

        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ratatui::style::Modifier;

    fn render(src: &str) -> RenderedMarkdown {
        match render_markdown_text(src) {
            Ok(rendered) => rendered,
            Err(err) => panic!("render failed: {err}"),
        }
    }

    fn plain(lines: &[Line<'static>]) -> Vec<String> {
        lines
            .iter()
            .map(|line| {
                line.spans
                    .iter()
                    .map(|span| span.content.clone())
                    .collect::<String>()
            })
            .collect()
    }

    #[test]
    fn bold_text_is_styled() {
        let rendered = render("Hello **world**");
        assert_eq!(plain(&rendered.lines), vec!["Hello world"]);
        let bold = rendered.lines[0]
            .spans
            .iter()
            .find(|span| span.content == "world");
        assert!(bold.is_some_and(|span| span.style.add_modifier.contains(Modifier::BOLD)));
    }

    #[test]
    fn single_newlines_become_line_breaks() {
        let rendered = render("first line\nsecond line");
        assert_eq!(plain(&rendered.lines), vec!["first line", "second line"]);
    }

    #[test]
    fn paragraphs_are_separated_by_a_blank_line() {
        let rendered = render("one\n\ntwo");
        assert_eq!(plain(&rendered.lines), vec!["one", "", "two"]);
    }

    #[test]
    fn lists_render_markers() {
        let rendered = render("- apples\n- pears\n\n1. first\n2. second\n");
        assert_eq!(
            plain(&rendered.lines),
            vec!["- apples", "- pears", "", "1. first", "2. second"]
        );
    }

    #[test]
    fn nested_list_items_are_indented() {
        let rendered = render("- outer\n    - inner\n");
        assert_eq!(plain(&rendered.lines), vec!["- outer", "    - inner"]);
    }

    #[test]
    fn task_list_items_show_their_state() {
        let rendered = render("- [x] done\n- [ ] todo\n");
        assert_eq!(plain(&rendered.lines), vec!["- [x] done", "- [ ] todo"]);
    }

    #[test]
    fn headings_keep_their_level_marker() {
        let rendered = render("## Section\nbody");
        assert_eq!(plain(&rendered.lines), vec!["## Section", "", "body"]);
    }

    #[test]
    fn blockquotes_are_prefixed() {
        let rendered = render("> quoted\n");
        assert_eq!(plain(&rendered.lines), vec!["> quoted"]);
        assert_eq!(rendered.lines[0].style, Style::new().green());
    }

    #[test]
    fn links_show_their_destination() {
        let rendered = render("see [docs](https://example.com) or <https://example.org>");
        assert_eq!(
            plain(&rendered.lines),
            vec!["see docs (https://example.com) or https://example.org"]
        );
    }

    #[test]
    fn fenced_code_gets_a_header_and_is_recorded() {
        let rendered = render("Intro\n\n```rust\nfn main() {}\n```\n");
        assert_eq!(
            plain(&rendered.lines),
            vec!["Intro", "", "▍ rust", "fn main() {}"]
        );
        assert_eq!(
            rendered.code_blocks,
            vec![CodeBlock {
                language: Some("rust".to_string()),
                code: "fn main() {}".to_string(),
            }]
        );
    }

    #[test]
    fn unterminated_fence_still_renders_its_body() {
        let rendered = render("```\nlet x = 1;\nlet y");
        assert_eq!(
            plain(&rendered.lines),
            vec!["▍ code", "let x = 1;", "let y"]
        );
        assert_eq!(rendered.code_blocks.len(), 1);
    }

    #[test]
    fn tables_render_with_box_borders() {
        let rendered = render("| Name | Qty |\n|:-----|----:|\n| a | 1 |\n| bbbbbb | 22 |\n");
        assert_eq!(
            plain(&rendered.lines),
            vec![
                "┌────────┬─────┐",
                "│ Name   │ Qty │",
                "├────────┼─────┤",
                "│ a      │   1 │",
                "│ bbbbbb │  22 │",
                "└────────┴─────┘",
            ]
        );
    }

    #[test]
    fn horizontal_rule_renders() {
        let rendered = render("above\n\n---\n\nbelow");
        assert_eq!(plain(&rendered.lines), vec!["above", "", "———", "", "below"]);
    }

    #[test]
    fn oversized_input_is_rejected() {
        let huge = "a".repeat(MAX_MARKDOWN_BYTES + 1);
        assert!(render_markdown_text(&huge).is_err());
    }
}
