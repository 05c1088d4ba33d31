use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

/// 口令框中替代每个字符的掩码
pub const MASK_CHAR: char = '●';

/// 渲染单行输入框
pub fn render_input_box(
    f: &mut Frame,
    content: &str,
    cursor_pos: usize,
    label: &str,
    focused: bool,
    area: Rect,
) {
    render_box(f, content.chars().collect(), cursor_pos, label, focused, area);
}

/// 口令框：只知道长度，显示等长的掩码
pub fn render_masked_box(
    f: &mut Frame,
    len: usize,
    cursor_pos: usize,
    label: &str,
    focused: bool,
    area: Rect,
) {
    render_box(f, vec![MASK_CHAR; len], cursor_pos, label, focused, area);
}

fn render_box(
    f: &mut Frame,
    chars: Vec<char>,
    cursor_pos: usize,
    label: &str,
    focused: bool,
    area: Rect,
) {
    let border_color = if focused { Color::Yellow } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    let cursor_pos = cursor_pos.min(chars.len());
    let before: String = chars[..cursor_pos].iter().collect();
    let cursor_char = chars
        .get(cursor_pos)
        .map(|c| c.to_string())
        .unwrap_or_else(|| " ".to_string());
    let after: String = chars.iter().skip(cursor_pos + 1).collect();

    let mut spans = Vec::new();
    if !label.is_empty() {
        spans.push(Span::styled(
            format!("{label} "),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
    }
    spans.push(Span::styled(before, Style::default().fg(Color::White)));

    if focused {
        spans.push(Span::styled(
            cursor_char,
            Style::default().fg(Color::Black).bg(Color::White),
        ));
    } else {
        spans.push(Span::styled(cursor_char, Style::default().fg(Color::White)));
    }

    spans.push(Span::styled(after, Style::default().fg(Color::White)));

    let paragraph = Paragraph::new(Line::from(spans)).block(block);
    f.render_widget(paragraph, area);
}

// ===== 共享文本编辑工具函数 =====

/// UTF-8 安全的字符位置转字节位置
pub fn char_to_byte(s: &str, char_pos: usize) -> usize {
    s.char_indices()
        .nth(char_pos)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// 在光标处插入字符并右移光标
pub fn str_insert_char(s: &mut String, cursor: &mut usize, c: char) {
    let byte_pos = char_to_byte(s, *cursor);
    s.insert(byte_pos, c);
    *cursor += 1;
}

/// Backspace: 删除光标前的字符
pub fn str_delete_back(s: &mut String, cursor: &mut usize) {
    if *cursor > 0 {
        *cursor -= 1;
        let byte_pos = char_to_byte(s, *cursor);
        let next_byte_pos = char_to_byte(s, *cursor + 1);
        s.drain(byte_pos..next_byte_pos);
    }
}

/// Delete: 删除光标后的字符
pub fn str_delete_forward(s: &mut String, cursor: &mut usize) {
    let char_count = s.chars().count();
    if *cursor < char_count {
        let byte_pos = char_to_byte(s, *cursor);
        let next_byte_pos = char_to_byte(s, *cursor + 1);
        s.drain(byte_pos..next_byte_pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_are_char_aware() {
        let mut s = String::new();
        let mut cursor = 0;
        for c in "vlç".chars() {
            str_insert_char(&mut s, &mut cursor, c);
        }
        assert_eq!(s, "vlç");
        assert_eq!(cursor, 3);

        cursor = 1;
        str_insert_char(&mut s, &mut cursor, 'é');
        assert_eq!(s, "vélç");

        str_delete_back(&mut s, &mut cursor);
        assert_eq!(s, "vlç");
        assert_eq!(cursor, 1);

        str_delete_forward(&mut s, &mut cursor);
        assert_eq!(s, "vç");
        assert_eq!(char_to_byte(&s, 5), s.len());
    }

    #[test]
    fn delete_at_bounds_is_noop() {
        let mut s = "ab".to_string();
        let mut cursor = 0;
        str_delete_back(&mut s, &mut cursor);
        cursor = 2;
        str_delete_forward(&mut s, &mut cursor);
        assert_eq!(s, "ab");
    }
}
