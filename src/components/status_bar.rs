use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Widget,
};

const KEY_HINTS: &str = " l:open  h:close  o:root  BS:up  r:refresh  .:hidden  q:quit ";

/// Status bar widget that displays the selected path, tree info, key hints,
/// or a transient status message.
pub struct StatusBarWidget<'a> {
    path_str: &'a str,
    info: &'a str,
    status_message: Option<&'a str>,
    is_error: bool,
}

impl<'a> StatusBarWidget<'a> {
    pub fn new(path_str: &'a str, info: &'a str) -> Self {
        Self {
            path_str,
            info,
            status_message: None,
            is_error: false,
        }
    }

    pub fn status_message(mut self, msg: &'a str, is_error: bool) -> Self {
        self.status_message = Some(msg);
        self.is_error = is_error;
        self
    }
}

/// Keep the last `budget` characters of `s`, marking the cut with "...".
fn truncate_left(s: &str, budget: usize) -> String {
    let len = s.chars().count();
    if len <= budget {
        return s.to_string();
    }
    if budget <= 3 {
        return s.chars().take(budget).collect();
    }
    let tail: String = s.chars().skip(len - (budget - 3)).collect();
    format!("...{tail}")
}

impl<'a> Widget for StatusBarWidget<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }
        let width = area.width as usize;

        if let Some(msg) = self.status_message {
            let style = if self.is_error {
                Style::default().bg(Color::Red).fg(Color::White)
            } else {
                Style::default().fg(Color::Green)
            };
            let display = format!("{:<width$}", msg, width = width);
            buf.set_line(area.x, area.y, &Line::from(Span::styled(display, style)), area.width);
            return;
        }

        // Normal bar: [path] [info] [key hints]
        let hints_len = KEY_HINTS.chars().count();
        let remaining = width.saturating_sub(hints_len);
        let info_len = self.info.chars().count();
        let path_budget = remaining.saturating_sub(info_len).saturating_sub(1);

        let path_display = truncate_left(self.path_str, path_budget);
        let info_budget = remaining.saturating_sub(path_display.chars().count());
        let info_display: String = self.info.chars().take(info_budget).collect();
        let gap = remaining
            .saturating_sub(path_display.chars().count())
            .saturating_sub(info_display.chars().count());

        let mut spans = vec![
            Span::styled(path_display, Style::default().fg(Color::White)),
            Span::raw(" ".repeat(gap)),
            Span::styled(info_display, Style::default().fg(Color::Cyan)),
        ];
        if width >= hints_len {
            spans.push(Span::styled(
                KEY_HINTS,
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM),
            ));
        }

        buf.set_line(area.x, area.y, &Line::from(spans), area.width);
    }
}
