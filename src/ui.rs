pub mod screen;

use chrono::Local;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthChar;

use vessel::{
    ash::AshAnimation,
    document::{BlockKind, BlockSnapshot, DocumentModel, FadeState},
    util::{format_duration, is_light_color, weighted_blend},
    vault::SessionMeta,
    vibe::{Rgb, VibeState},
};

use crate::{ui::screen::current_screen, App};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

/// Weights at or above this render bold
const BOLD_WEIGHT: u16 = 550;

const PLACEHOLDER: &str = "start writing";

const WRITING_LEGEND: &str = "^T mode ^D dissolve ^O vault F1 help";
const GATE_LEGEND: &str = "(enter) submit / (esc)ape";
const VAULT_LEGEND: &str = "(↑↓) select / (enter) open / (del)ete / (esc)ape";
const SESSION_LEGEND: &str = "(del)ete / (esc)ape";

const HELP: [(&str, &str); 6] = [
    ("Ctrl+T", "toggle permanent / transient"),
    ("Ctrl+D", "dissolve the page"),
    ("Ctrl+O", "save and open the vault"),
    ("F1", "this help"),
    ("Esc", "back"),
    ("Ctrl+Q", "save and quit"),
];

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        current_screen(self.state).render(self, area, buf);

        if let Some(ash) = &self.ash {
            let background = self.engine.profile().background;
            render_ash(ash, page_area(area), background, buf);
        }

        if self.show_help {
            render_help(area, buf);
        }
    }
}

fn color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.r, rgb.g, rgb.b)
}

/// Where the writing surface sits inside the terminal: everything but the
/// status line, inset by the page margins
pub fn page_area(area: Rect) -> Rect {
    let [page, _status] = split_status(area);
    Layout::default()
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([Constraint::Min(0)])
        .split(page)[0]
}

fn split_status(area: Rect) -> [Rect; 2] {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);
    [chunks[0], chunks[1]]
}

fn block_style(base: Style, block: &BlockSnapshot) -> Style {
    let style = match block.kind {
        BlockKind::Paragraph => base,
        BlockKind::Heading(1) => base.add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        BlockKind::Heading(_) => base.add_modifier(Modifier::BOLD),
        BlockKind::Quote => base.add_modifier(Modifier::ITALIC),
    };
    match block.fade {
        FadeState::Active => style,
        FadeState::Fading => style.add_modifier(Modifier::DIM),
    }
}

struct Wrapped {
    lines: Vec<Line<'static>>,
    cursor_row: Option<usize>,
}

/// Hard-wrap one block at `width` display columns. When `cursor` is set the
/// character under it (or a trailing blank) is drawn reversed.
fn wrap_block(text: &str, width: usize, style: Style, cursor: Option<usize>) -> Wrapped {
    let width = width.max(1);
    let cursor_style = style.add_modifier(Modifier::REVERSED);
    let chars: Vec<char> = text.chars().collect();

    let mut lines = Vec::new();
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut run = String::new();
    let mut col = 0;
    let mut cursor_row = None;

    for i in 0..=chars.len() {
        let at_cursor = cursor == Some(i);
        let c = match chars.get(i) {
            Some(c) => *c,
            None if at_cursor => ' ',
            None => break,
        };
        let w = c.width().unwrap_or(0);

        if col + w > width && col > 0 {
            if !run.is_empty() {
                spans.push(Span::styled(std::mem::take(&mut run), style));
            }
            lines.push(Line::from(std::mem::take(&mut spans)));
            col = 0;
        }

        if at_cursor {
            if !run.is_empty() {
                spans.push(Span::styled(std::mem::take(&mut run), style));
            }
            spans.push(Span::styled(c.to_string(), cursor_style));
            cursor_row = Some(lines.len());
        } else {
            run.push(c);
        }
        col += w;
    }

    if !run.is_empty() {
        spans.push(Span::styled(run, style));
    }
    lines.push(Line::from(spans));

    Wrapped { lines, cursor_row }
}

pub(crate) fn render_writing(app: &App, area: Rect, buf: &mut Buffer) {
    let profile = app.engine.profile();
    let background = Style::default()
        .bg(color(profile.background))
        .fg(color(profile.foreground));
    Block::default().style(background).render(area, buf);

    let mut base = background;
    if app.engine.weight() >= BOLD_WEIGHT {
        base = base.add_modifier(Modifier::BOLD);
    }

    let page = page_area(area);
    let doc = app.engine.document();
    let cursor = doc.cursor();

    let mut lines: Vec<Line> = Vec::new();
    let mut cursor_line = 0;
    for (i, block) in doc.blocks().iter().enumerate() {
        if i > 0 {
            lines.push(Line::default());
        }
        let wrapped = wrap_block(
            &block.text,
            page.width as usize,
            block_style(base, block),
            (i == cursor.block).then_some(cursor.offset),
        );
        if let Some(row) = wrapped.cursor_row {
            cursor_line = lines.len() + row;
        }
        lines.extend(wrapped.lines);
    }

    if doc.is_empty() && doc.block_count() == 1 {
        if let Some(first) = lines.first_mut() {
            first.spans.push(Span::styled(
                format!(" {PLACEHOLDER}"),
                background.add_modifier(Modifier::DIM | Modifier::ITALIC),
            ));
        }
    }

    // keep the cursor on screen
    let scroll = cursor_line.saturating_sub((page.height as usize).saturating_sub(1));
    Paragraph::new(lines)
        .scroll((scroll as u16, 0))
        .render(page, buf);

    let [_, status] = split_status(area);
    render_status(app, status, background, buf);
}

fn render_status(app: &App, area: Rect, style: Style, buf: &mut Buffer) {
    let dim = style.add_modifier(Modifier::DIM);
    let metrics = app.engine.metrics();

    let right = match app.status_message() {
        Some(message) => Span::styled(message.to_string(), style.add_modifier(Modifier::ITALIC)),
        None => Span::styled(WRITING_LEGEND, dim),
    };

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .horizontal_margin(1)
        .constraints([Constraint::Min(0), Constraint::Length(right.width() as u16)])
        .split(area);

    let left = Paragraph::new(Span::styled(
        format!(
            "{} · {} · {} wpm · {}",
            app.engine.mode(),
            app.engine.vibe(),
            metrics.wpm,
            app.engine.weight()
        ),
        dim,
    ));
    left.render(chunks[0], buf);

    Paragraph::new(right)
        .alignment(Alignment::Right)
        .render(chunks[1], buf);
}

fn render_ash(ash: &AshAnimation, page: Rect, background: Rgb, buf: &mut Buffer) {
    for particle in ash.particles.iter().filter(|p| p.is_alive()) {
        if particle.x < 0.0 || particle.y < 0.0 {
            continue;
        }
        let (x, y) = (particle.x as u16, particle.y as u16);
        if x >= page.width || y >= page.height {
            continue;
        }

        // fade toward the page instead of alpha blending
        let opacity = particle.opacity.clamp(0.0, 1.0);
        let tint = weighted_blend(&[(particle.color, opacity), (background, 1.0 - opacity)])
            .unwrap_or(particle.color);

        let mut style = Style::default().fg(color(tint)).bg(color(background));
        if particle.size > 2.5 {
            style = style.add_modifier(Modifier::BOLD);
        }

        if let Some(cell) = buf.cell_mut((page.x + x, page.y + y)) {
            cell.set_symbol(&particle.glyph().to_string());
            cell.set_style(style);
        }
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn render_help(area: Rect, buf: &mut Buffer) {
    let popup = centered(area, 44, HELP.len() as u16 + 4);
    Clear.render(popup, buf);

    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let mut lines: Vec<Line> = HELP
        .iter()
        .map(|(key, action)| {
            Line::from(vec![
                Span::styled(format!("{key:<8}"), bold_style),
                Span::raw(*action),
            ])
        })
        .collect();
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(
        "(esc) close",
        Style::default().add_modifier(Modifier::ITALIC),
    )));

    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" help "))
        .render(popup, buf);
}

fn screen_chunks(area: Rect) -> [Rect; 2] {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(area);
    [chunks[0], chunks[1]]
}

fn render_legend(text: &'static str, area: Rect, buf: &mut Buffer) {
    Paragraph::new(Span::styled(
        text,
        Style::default().add_modifier(Modifier::ITALIC),
    ))
    .render(area, buf);
}

pub(crate) fn render_gate(app: &App, area: Rect, buf: &mut Buffer) {
    let [body, legend] = screen_chunks(area);

    let Some(gate) = &app.gate else {
        render_legend(GATE_LEGEND, legend, buf);
        return;
    };

    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let mut lines = vec![
        Line::from(Span::styled(gate.prompt(), bold_style)),
        Line::default(),
        Line::from(format!("> {}", "•".repeat(gate.input_len()))),
    ];
    if let Some(message) = gate.message() {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            message,
            Style::default().fg(Color::Red).add_modifier(Modifier::ITALIC),
        )));
    }

    let popup = centered(body, 48, lines.len() as u16 + 2);
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" vault "))
        .alignment(Alignment::Center)
        .render(popup, buf);

    render_legend(GATE_LEGEND, legend, buf);
}

/// Colour chip for a session's dominant state, labelled in a colour that
/// stays readable on it
fn swatch(meta: &SessionMeta) -> Span<'static> {
    let label = format!(" {:<11} ", meta.dominant_state.to_string());
    match Rgb::from_hex(&meta.average_color) {
        Some(rgb) => {
            let fg = if is_light_color(rgb) {
                Color::Black
            } else {
                Color::White
            };
            Span::styled(label, Style::default().bg(color(rgb)).fg(fg))
        }
        None => Span::raw(label),
    }
}

fn session_summary(meta: &SessionMeta) -> String {
    format!(
        "{}  {:>7}  {:>5} words",
        meta.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        format_duration(meta.duration_ms),
        meta.word_count
    )
}

pub(crate) fn render_vault(app: &App, area: Rect, buf: &mut Buffer) {
    let [body, legend] = screen_chunks(area);
    let sessions = app.browser.sessions();

    if sessions.is_empty() {
        Paragraph::new(Span::styled(
            "No sessions yet.",
            Style::default().add_modifier(Modifier::DIM | Modifier::ITALIC),
        ))
        .alignment(Alignment::Center)
        .render(body, buf);
        render_legend(VAULT_LEGEND, legend, buf);
        return;
    }

    let highlighted = app.browser.highlighted_index();
    let lines: Vec<Line> = sessions
        .iter()
        .enumerate()
        .map(|(i, meta)| {
            let text_style = if i == highlighted {
                Style::default().add_modifier(Modifier::REVERSED)
            } else {
                Style::default()
            };
            Line::from(vec![
                swatch(meta),
                Span::raw("  "),
                Span::styled(session_summary(meta), text_style),
            ])
        })
        .collect();

    let scroll = highlighted.saturating_sub((body.height as usize).saturating_sub(1));
    Paragraph::new(lines)
        .scroll((scroll as u16, 0))
        .render(body, buf);

    render_legend(VAULT_LEGEND, legend, buf);
}

pub(crate) fn render_session(app: &App, area: Rect, buf: &mut Buffer) {
    let [body, legend] = screen_chunks(area);

    let Some(selected) = app.browser.selected() else {
        render_legend(SESSION_LEGEND, legend, buf);
        return;
    };
    let meta = &selected.meta;

    let accent = Rgb::from_hex(&meta.average_color)
        .unwrap_or_else(|| VibeState::Neutral.profile().background);
    let frame = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color(accent)))
        .title(Line::from(vec![
            Span::raw(" "),
            swatch(meta),
            Span::raw(format!(" {} ", session_summary(meta))),
        ]));
    let inner = frame.inner(body);
    frame.render(body, buf);

    let content = selected
        .document
        .as_ref()
        .filter(|doc| !doc.is_empty());

    match content {
        Some(doc) => {
            let mut lines: Vec<Line> = Vec::new();
            for (i, block) in doc.blocks().iter().enumerate() {
                if i > 0 {
                    lines.push(Line::default());
                }
                let style = block_style(Style::default(), block);
                lines.extend(wrap_block(&block.text, inner.width as usize, style, None).lines);
            }
            Paragraph::new(lines)
                .wrap(Wrap { trim: false })
                .render(inner, buf);
        }
        None => {
            Paragraph::new(Span::styled(
                "No content to display.",
                Style::default().add_modifier(Modifier::DIM | Modifier::ITALIC),
            ))
            .alignment(Alignment::Center)
            .render(inner, buf);
        }
    }

    render_legend(SESSION_LEGEND, legend, buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppState;
    use vessel::{
        clock::SystemClock,
        document::BlockDocument,
        engine::Vessel,
        transient::WritingMode,
        vault::{SessionMetadata, SessionVault, SqliteVault},
    };

    fn create_test_app(mode: WritingMode) -> App {
        let vault = SqliteVault::open_in_memory().unwrap();
        App::new(Vessel::new(
            BlockDocument::default(),
            SystemClock::new(),
            vault,
            mode,
        ))
    }

    fn render(app: &App, width: u16, height: u16) -> Buffer {
        let area = Rect::new(0, 0, width, height);
        let mut buffer = Buffer::empty(area);
        app.render(area, &mut buffer);
        buffer
    }

    fn rows(buffer: &Buffer) -> Vec<String> {
        let area = buffer.area;
        (0..area.height)
            .map(|y| {
                (0..area.width)
                    .filter_map(|x| buffer.cell((x, y)).map(|c| c.symbol().to_string()))
                    .collect()
            })
            .collect()
    }

    fn rendered(buffer: &Buffer) -> String {
        rows(buffer).join("\n")
    }

    /// Cell coordinates of the first occurrence of a needle
    fn find(buffer: &Buffer, needle: &str) -> Option<(u16, u16)> {
        rows(buffer).iter().enumerate().find_map(|(y, row)| {
            row.find(needle)
                .map(|byte| (row[..byte].chars().count() as u16, y as u16))
        })
    }

    fn metadata(words: usize) -> SessionMetadata {
        SessionMetadata {
            average_color: "#b4614d".to_string(),
            dominant_state: VibeState::Inspiration,
            duration_ms: 65 * 60_000,
            word_count: words,
        }
    }

    #[test]
    fn test_empty_page_shows_placeholder_and_status() {
        let app = create_test_app(WritingMode::Permanent);
        let text = rendered(&render(&app, 80, 24));
        assert!(text.contains(PLACEHOLDER));
        assert!(text.contains("permanent · neutral · 0 wpm · 400"));
        assert!(text.contains("^D dissolve"));
    }

    #[test]
    fn test_page_is_tinted_by_the_vibe() {
        let app = create_test_app(WritingMode::Permanent);
        let buffer = render(&app, 80, 24);
        let neutral = VibeState::Neutral.profile();
        let cell = buffer.cell((0, 0)).unwrap();
        assert_eq!(cell.bg, color(neutral.background));
        assert_eq!(cell.fg, color(neutral.foreground));
    }

    #[test]
    fn test_typed_text_is_rendered() {
        let mut app = create_test_app(WritingMode::Permanent);
        app.engine.edit(|doc| {
            doc.insert_str("first paragraph");
            doc.split_block();
            doc.insert_str("second");
        });
        let buffer = render(&app, 80, 24);
        let (_, first_row) = find(&buffer, "first paragraph").unwrap();
        let (_, second_row) = find(&buffer, "second").unwrap();
        // one blank row between blocks
        assert_eq!(second_row, first_row + 2);
        assert!(!rendered(&buffer).contains(PLACEHOLDER));
    }

    #[test]
    fn test_cursor_is_reversed() {
        let mut app = create_test_app(WritingMode::Permanent);
        app.engine.edit(|doc| doc.insert_str("abc"));
        let buffer = render(&app, 80, 24);
        let (x, y) = find(&buffer, "abc").unwrap();
        let after = buffer.cell((x + 3, y)).unwrap();
        assert!(after.modifier.contains(Modifier::REVERSED));
        let inside = buffer.cell((x, y)).unwrap();
        assert!(!inside.modifier.contains(Modifier::REVERSED));
    }

    #[test]
    fn test_fading_blocks_are_dimmed() {
        let mut app = create_test_app(WritingMode::Transient);
        app.engine.edit(|doc| doc.insert_str("going soon"));
        app.engine.document_mut().set_fade_state_at(0, FadeState::Fading);
        let buffer = render(&app, 80, 24);
        let (x, y) = find(&buffer, "going").unwrap();
        assert!(buffer.cell((x, y)).unwrap().modifier.contains(Modifier::DIM));
    }

    #[test]
    fn test_headings_are_bold() {
        let mut app = create_test_app(WritingMode::Permanent);
        app.engine.edit(|doc| doc.insert_str("# Title"));
        let buffer = render(&app, 80, 24);
        let (x, y) = find(&buffer, "Title").unwrap();
        assert!(buffer.cell((x, y)).unwrap().modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_long_text_wraps_and_follows_cursor() {
        let mut app = create_test_app(WritingMode::Permanent);
        let long = "word ".repeat(400);
        app.engine.edit(|doc| {
            doc.insert_str(&long);
            doc.insert_str("tail");
        });
        let buffer = render(&app, 40, 12);
        assert!(rendered(&buffer).contains("tail"));
    }

    #[test]
    fn test_wrap_block_places_cursor_on_wrapped_row() {
        let wrapped = wrap_block("abcdef", 4, Style::default(), Some(5));
        assert_eq!(wrapped.lines.len(), 2);
        assert_eq!(wrapped.cursor_row, Some(1));

        let at_end = wrap_block("abcd", 4, Style::default(), Some(4));
        assert_eq!(at_end.lines.len(), 2);
        assert_eq!(at_end.cursor_row, Some(1));

        let no_cursor = wrap_block("", 4, Style::default(), None);
        assert_eq!(no_cursor.lines.len(), 1);
        assert_eq!(no_cursor.cursor_row, None);
    }

    #[test]
    fn test_status_message_replaces_legend() {
        let mut app = create_test_app(WritingMode::Permanent);
        app.status = Some(("session saved (3 words)".to_string(), app.engine.now()));
        let text = rendered(&render(&app, 100, 24));
        assert!(text.contains("session saved (3 words)"));
        assert!(!text.contains("^D dissolve"));
    }

    #[test]
    fn test_help_overlay() {
        let mut app = create_test_app(WritingMode::Permanent);
        app.show_help = true;
        let text = rendered(&render(&app, 80, 24));
        assert!(text.contains("dissolve the page"));
        assert!(text.contains("(esc) close"));
    }

    #[test]
    fn test_ash_overlay_draws_particles() {
        let mut app = create_test_app(WritingMode::Transient);
        app.engine.edit(|doc| doc.insert_str("burn"));
        let snapshot = app.engine.dissolve();
        let page = page_area(Rect::new(0, 0, 80, 24));
        app.ash = Some(AshAnimation::new(&snapshot, page.width, page.height));

        let buffer = render(&app, 80, 24);
        let ash = app.ash.as_ref().unwrap();
        assert_eq!(ash.particles.len(), 4);
        for particle in &ash.particles {
            let cell = buffer
                .cell((page.x + particle.x as u16, page.y + particle.y as u16))
                .unwrap();
            assert_eq!(cell.symbol(), particle.glyph().to_string());
        }
    }

    #[test]
    fn test_gate_screen_masks_input() {
        let mut app = create_test_app(WritingMode::Permanent);
        let mut gate = vessel::vault::VaultGate::open(app.engine.vault());
        gate.push_char('s');
        gate.push_char('e');
        app.gate = Some(gate);
        app.state = AppState::VaultGate;

        let text = rendered(&render(&app, 80, 24));
        assert!(text.contains("> ••"));
        assert!(!text.contains("> se"));
    }

    #[test]
    fn test_empty_vault_list() {
        let mut app = create_test_app(WritingMode::Permanent);
        app.state = AppState::Vault;
        let text = rendered(&render(&app, 80, 24));
        assert!(text.contains("No sessions yet."));
    }

    #[test]
    fn test_vault_list_rows() {
        let mut app = create_test_app(WritingMode::Permanent);
        app.engine.vault_mut().save_session("{}", &metadata(12)).unwrap();
        app.browser.refresh(app.engine.vault());
        app.state = AppState::Vault;

        let buffer = render(&app, 100, 24);
        let text = rendered(&buffer);
        assert!(text.contains("inspiration"));
        assert!(text.contains("1h 5m"));
        assert!(text.contains("12 words"));

        // dark swatch gets a light label
        let (x, y) = find(&buffer, "inspiration").unwrap();
        let cell = buffer.cell((x, y)).unwrap();
        assert_eq!(cell.bg, Color::Rgb(0xb4, 0x61, 0x4d));
        assert_eq!(cell.fg, Color::White);
    }

    #[test]
    fn test_session_view_with_malformed_content() {
        let mut app = create_test_app(WritingMode::Permanent);
        let id = app
            .engine
            .vault_mut()
            .save_session("not a document", &metadata(2))
            .unwrap();
        app.browser.refresh(app.engine.vault());
        assert!(app.browser.select(app.engine.vault(), &id));
        app.state = AppState::VaultSession;

        let text = rendered(&render(&app, 80, 24));
        assert!(text.contains("No content to display."));
    }

    #[test]
    fn test_session_view_shows_stored_text() {
        let mut app = create_test_app(WritingMode::Permanent);
        let doc = BlockDocument::from_paragraphs(
            vessel::document::BlockIdAllocator::sequential(),
            &["kept words", "and more"],
        );
        let id = app
            .engine
            .vault_mut()
            .save_session(&doc.to_json(), &metadata(4))
            .unwrap();
        app.browser.refresh(app.engine.vault());
        assert!(app.browser.select(app.engine.vault(), &id));
        app.state = AppState::VaultSession;

        let text = rendered(&render(&app, 80, 24));
        assert!(text.contains("kept words"));
        assert!(text.contains("and more"));
    }

    #[test]
    fn test_extreme_sizes_do_not_panic() {
        let mut app = create_test_app(WritingMode::Permanent);
        app.engine.edit(|doc| doc.insert_str("some text on the page"));
        app.show_help = true;
        for (w, h) in [(1, 1), (10, 5), (200, 5), (20, 50)] {
            let buffer = render(&app, w, h);
            assert_eq!(buffer.area, Rect::new(0, 0, w, h));
        }
    }
}
