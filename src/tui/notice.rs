use super::layout::centered_rect;
use super::state::Notice;
use super::theme::DANGER;
use ratatui::{
    layout::Alignment,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

const NOTICE_WIDTH: u16 = 64;

/// 模态提示框，盖在当前页面之上
pub fn render_notice(f: &mut Frame, notice: &Notice, pending: usize) {
    let area = f.area();
    let detail_lines = notice.detail.lines().count().max(1) as u16;
    let height = (detail_lines + 6).min(area.height);
    let popup = centered_rect(NOTICE_WIDTH, height, area);

    f.render_widget(Clear, popup);

    let block = Block::default()
        .title(Span::styled(
            format!(" {} ", notice.title),
            Style::default().fg(DANGER).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(DANGER));

    let mut lines: Vec<Line> = vec![Line::from("")];
    for line in notice.detail.lines() {
        lines.push(Line::from(Span::styled(
            line.to_string(),
            Style::default().fg(Color::White),
        )));
    }
    lines.push(Line::from(""));

    let action = if notice.quit_on_dismiss { "Quit" } else { "OK" };
    let mut hint = vec![
        Span::styled("[Enter]", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        Span::styled(format!(" {action}"), Style::default().fg(Color::White)),
    ];
    if pending > 1 {
        hint.push(Span::styled(
            format!("   (+{} more)", pending - 1),
            Style::default().fg(Color::DarkGray),
        ));
    }
    lines.push(Line::from(hint).alignment(Alignment::Center));

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    f.render_widget(paragraph, popup);
}
