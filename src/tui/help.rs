use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key_line(key: &str, pad: usize, action: &str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key.to_string(), Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(pad)),
        Span::raw(action.to_string()),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Exit"),
        ]),
        key_line("f / F10", 5, "File menu"),
        key_line("o", 11, "Open image"),
        key_line("v", 11, "Image2Text from clipboard"),
        key_line("y", 11, "Copy result to clipboard"),
        key_line("e", 11, "Export list"),
        key_line("i", 11, "Import list"),
        key_line("t", 11, "Toggle fast mode"),
        key_line("?", 11, "Show this help"),
        Line::from(""),
        Line::from("Prompt list:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("↑/↓", Style::default().fg(Color::Magenta)),
            Span::raw(" or "),
            Span::styled("j/k", Style::default().fg(Color::Magenta)),
            Span::raw("  Navigate"),
        ]),
        key_line("space", 7, "Select / deselect"),
        key_line("a", 11, "Select all / none"),
        key_line("enter", 7, "Show prompt in output"),
        key_line("m", 11, "Merge selected prompts"),
        key_line("c", 11, "Clear list"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
