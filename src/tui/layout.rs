use ratatui::{
    layout::{Alignment, Constraint, Flex, Layout, Margin, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
    Frame,
};

/// 渲染通用 header
pub fn render_header(f: &mut Frame, title: &str, area: Rect) {
    let header = Paragraph::new(title)
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
    f.render_widget(header, area);
}

/// 渲染通用 footer
pub fn render_footer(f: &mut Frame, text: &str, area: Rect) {
    let footer = Paragraph::new(format!(" {}", text))
        .style(Style::default().fg(Color::Green))
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Left);
    f.render_widget(footer, area);
}

/// 渲染带滚动条的内容区域
pub fn render_scrollable_content(
    f: &mut Frame,
    title: &str,
    lines: &[Line],
    scroll_offset: usize,
    focused: bool,
    area: Rect,
) {
    let border_color = if focused { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .title(format!(" {} ", title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    let inner = block.inner(area);
    f.render_widget(block, area);

    // 内部水平边距
    let padded = inner.inner(Margin {
        horizontal: 1,
        vertical: 0,
    });

    let total_lines = lines.len();
    let visible_height = padded.height as usize;
    let actual_scroll = clamp_scroll(scroll_offset, total_lines, visible_height);

    let visible_content: Vec<Line> = lines
        .iter()
        .skip(actual_scroll)
        .take(visible_height)
        .cloned()
        .collect();

    let paragraph = Paragraph::new(visible_content).wrap(Wrap { trim: false });

    f.render_widget(paragraph, padded);

    // 滚动条
    if total_lines > visible_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("↑"))
            .end_symbol(Some("↓"));

        let mut scrollbar_state = ScrollbarState::new(total_lines).position(actual_scroll);

        f.render_stateful_widget(
            scrollbar,
            area.inner(Margin {
                horizontal: 0,
                vertical: 1,
            }),
            &mut scrollbar_state,
        );
    }
}

/// 滚动偏移不超过最后一屏
pub fn clamp_scroll(offset: usize, total: usize, visible: usize) -> usize {
    offset.min(total.saturating_sub(visible))
}

/// 在 area 中居中放置固定大小的弹窗，超出时收缩到 area 内
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height.min(area.height))])
        .flex(Flex::Center)
        .areas(area);
    let [rect] = Layout::horizontal([Constraint::Length(width.min(area.width))])
        .flex(Flex::Center)
        .areas(row);
    rect
}

/// 水平平移弹窗（抖动动画），保持在 area 内
pub fn shift_rect(rect: Rect, dx: i16, area: Rect) -> Rect {
    let min_x = area.x as i32;
    let max_x = (area.x + area.width).saturating_sub(rect.width) as i32;
    let x = (rect.x as i32 + dx as i32).clamp(min_x, max_x.max(min_x));
    Rect { x: x as u16, ..rect }
}
