use ratatui::{
    layout::{Constraint, Direction, Layout},
    widgets::{Block, Borders},
    Frame,
};

use crate::app::App;
use crate::components::status_bar::StatusBarWidget;
use crate::components::tree::TreeWidget;
use crate::fs::tree::FlatItem;

/// Render the application UI.
pub fn render(app: &mut App, frame: &mut Frame) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(frame.area());

    // Keep the selected row visible inside the border.
    let visible_height = chunks[0].height.saturating_sub(2) as usize;
    app.update_scroll(visible_height);

    let title = match app.view.rows.first() {
        Some(root) => format!(" {} ", root.name),
        None => " (no root) ".to_string(),
    };
    let block = Block::default().title(title).borders(Borders::ALL);
    let tree = TreeWidget::new(&app.view, app.selected_index, app.scroll_offset).block(block);
    frame.render_widget(tree, chunks[0]);

    let path = app
        .selected_path()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let info = selection_info(app.selected(), app.expander.pending_enrichments(), app.expander.show_hidden());
    let mut status = StatusBarWidget::new(&path, &info);
    if let Some((msg, is_error, _)) = &app.status_message {
        status = status.status_message(msg, *is_error);
    }
    frame.render_widget(status, chunks[1]);
}

/// Short description of the selected row for the status bar.
fn selection_info(item: Option<&FlatItem>, pending: usize, show_hidden: bool) -> String {
    let mut parts = Vec::new();
    if let Some(item) = item {
        if !item.is_directory && item.enriched {
            if let Some(key) = &item.key {
                parts.push(format!("key {key}"));
            }
            if let Some(bpm) = &item.bpm {
                parts.push(format!("{bpm} BPM"));
            }
        }
    }
    if pending > 0 {
        parts.push(format!("reading {pending}"));
    }
    if show_hidden {
        parts.push("hidden shown".to_string());
    }
    parts.join(" | ")
}
