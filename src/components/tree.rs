use std::time::SystemTime;

use chrono::{DateTime, Local};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Widget},
};

use crate::fs::tree::{ExpansionState, FlatItem, TreeView};

/// Placeholder shown in the key/BPM columns until enrichment has run.
const PENDING: &str = "··";

/// Tree widget that renders the materialized tree with box-drawing characters
/// and right-aligned key, BPM, size and modified columns.
pub struct TreeWidget<'a> {
    view: &'a TreeView,
    selected: usize,
    scroll_offset: usize,
    block: Option<Block<'a>>,
}

impl<'a> TreeWidget<'a> {
    pub fn new(view: &'a TreeView, selected: usize, scroll_offset: usize) -> Self {
        Self {
            view,
            selected,
            scroll_offset,
            block: None,
        }
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = block.into();
        self
    }

    /// Build the indentation prefix. Each ancestor level draws a continuation
    /// line unless that ancestor was the last of its siblings.
    fn build_prefix(item: &FlatItem, items: &[FlatItem], item_index: usize) -> String {
        if item.depth == 0 {
            return String::new();
        }

        let mut prefix = String::new();
        for d in 1..item.depth {
            let ancestor_is_last = items[..item_index]
                .iter()
                .rev()
                .take_while(|row| row.depth >= d)
                .find(|row| row.depth == d)
                .is_some_and(|row| row.is_last_sibling);
            prefix.push_str(if ancestor_is_last { "   " } else { "│  " });
        }
        prefix.push_str(if item.is_last_sibling { "└──" } else { "├──" });
        prefix
    }

    fn indicator(item: &FlatItem) -> &'static str {
        if !item.is_directory {
            return " ♪ ";
        }
        match item.state {
            ExpansionState::Expanded => " ▾ ",
            ExpansionState::Expanding => " … ",
            ExpansionState::Collapsed => " ▸ ",
        }
    }

    /// Right-hand column: key, BPM and size for files, then the modified time.
    /// Directories only show the modified time.
    fn details(item: &FlatItem) -> String {
        let modified = format_modified(item.modified);
        if item.is_directory {
            return format!("{:>4} {:>6} {:>10} {:>16} ", "", "", "", modified);
        }
        let (key, bpm) = if item.enriched {
            (
                item.key.as_deref().unwrap_or(""),
                item.bpm.as_deref().unwrap_or(""),
            )
        } else {
            (PENDING, PENDING)
        };
        format!(
            "{:>4} {:>6} {:>10} {:>16} ",
            key,
            bpm,
            format_size(item.size),
            modified
        )
    }

    fn style(item: &FlatItem, is_selected: bool) -> Style {
        if is_selected {
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD)
        } else if item.is_directory {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Reset)
        }
    }
}

impl<'a> Widget for TreeWidget<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner_area = if let Some(block) = &self.block {
            let inner = block.inner(area);
            block.clone().render(area, buf);
            inner
        } else {
            area
        };

        let items = &self.view.rows;
        let visible_height = inner_area.height as usize;
        if items.is_empty() || visible_height == 0 || inner_area.width == 0 {
            return;
        }

        let visible = items
            .iter()
            .enumerate()
            .skip(self.scroll_offset)
            .take(visible_height);

        for (row, (idx, item)) in visible.enumerate() {
            let y = inner_area.y + row as u16;
            let style = Self::style(item, idx == self.selected);

            let details = Self::details(item);
            let details_width = (details.chars().count() as u16).min(inner_area.width);
            let name_width = inner_area.width - details_width;

            let label = format!(
                "{}{}{}",
                Self::build_prefix(item, items, idx),
                Self::indicator(item),
                item.name
            );
            let padded = format!("{:<width$}", label, width = name_width as usize);
            buf.set_line(
                inner_area.x,
                y,
                &Line::from(Span::styled(padded, style)),
                name_width,
            );

            if details_width > 0 {
                let details_style = if idx == self.selected {
                    style
                } else {
                    Style::default().fg(Color::Yellow)
                };
                buf.set_line(
                    inner_area.x + name_width,
                    y,
                    &Line::from(Span::styled(details, details_style)),
                    details_width,
                );
            }
        }
    }
}

/// Short local date and time, blank when the filesystem gave none.
pub fn format_modified(modified: Option<SystemTime>) -> String {
    match modified {
        Some(time) => {
            let local: DateTime<Local> = time.into();
            local.format("%Y-%m-%d %H:%M").to_string()
        }
        None => String::new(),
    }
}

/// Format bytes into a human-readable size string.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::access::DirEntryInfo;
    use crate::fs::tree::TreeStore;
    use crate::tags::TrackTags;
    use std::path::Path;
    use std::time::{Duration, UNIX_EPOCH};

    /// 2024-06-15 12:00 UTC, mid-month so no time zone moves it out of June.
    fn june_noon() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_718_452_800)
    }

    fn entry(path: &str, is_dir: bool, size: u64) -> DirEntryInfo {
        let path = Path::new(path);
        DirEntryInfo {
            path: path.to_path_buf(),
            name: path.file_name().unwrap().to_string_lossy().to_string(),
            is_dir,
            size,
            modified: Some(june_noon()),
            is_hidden: false,
        }
    }

    /// music/
    /// ├── house/
    /// │   └── deep.mp3
    /// ├── intro.mp3   (tagged)
    /// └── outro.wav   (not yet enriched)
    fn sample_view() -> TreeView {
        let mut store = TreeStore::new();
        let (root, generation) = store.set_root(entry("/music", true, 0));
        let kids = store
            .commit_children(
                generation,
                root,
                vec![
                    entry("/music/house", true, 0),
                    entry("/music/intro.mp3", false, 2048),
                    entry("/music/outro.wav", false, 10),
                ],
            )
            .unwrap();
        store
            .commit_children(generation, kids[0], vec![entry("/music/house/deep.mp3", false, 1)])
            .unwrap();
        store
            .commit_metadata(generation, kids[1], TrackTags::new("8A", "124"))
            .unwrap();
        store.flatten(|_| ExpansionState::Expanded)
    }

    fn row_text(buf: &Buffer, y: u16, width: u16) -> String {
        (0..width)
            .map(|x| buf.cell((x, y)).unwrap().symbol().to_string())
            .collect()
    }

    #[test]
    fn prefixes_follow_sibling_position() {
        let view = sample_view();
        let rows = &view.rows;
        let prefixes: Vec<String> = (0..rows.len())
            .map(|i| TreeWidget::build_prefix(&rows[i], rows, i))
            .collect();
        assert_eq!(prefixes, vec!["", "├──", "│  └──", "├──", "└──"]);
    }

    #[test]
    fn renders_names_and_details() {
        let view = sample_view();
        let area = Rect::new(0, 0, 60, 5);
        let mut buf = Buffer::empty(area);
        TreeWidget::new(&view, 0, 0).render(area, &mut buf);

        assert!(row_text(&buf, 0, 60).contains("▾ music"));
        assert!(row_text(&buf, 1, 60).contains("house"));
        let intro = row_text(&buf, 3, 60);
        assert!(intro.contains("intro.mp3"));
        assert!(intro.contains("8A"));
        assert!(intro.contains("124"));
        assert!(intro.contains("2.0 KB"));
        assert!(row_text(&buf, 4, 60).contains(PENDING));
    }

    #[test]
    fn modified_time_shown_for_files_and_directories() {
        let view = sample_view();
        let area = Rect::new(0, 0, 80, 5);
        let mut buf = Buffer::empty(area);
        TreeWidget::new(&view, 0, 0).render(area, &mut buf);

        let stamp = format_modified(Some(june_noon()));
        assert!(stamp.starts_with("2024-06-1"));
        assert_eq!(stamp.len(), "2024-06-15 12:00".len());
        for y in 0..5 {
            assert!(row_text(&buf, y, 80).contains(&stamp), "row {y}");
        }
    }

    #[test]
    fn missing_modified_time_is_blank() {
        assert_eq!(format_modified(None), "");
    }

    #[test]
    fn selected_row_is_highlighted() {
        let view = sample_view();
        let area = Rect::new(0, 0, 60, 5);
        let mut buf = Buffer::empty(area);
        TreeWidget::new(&view, 2, 0).render(area, &mut buf);

        assert_eq!(buf.cell((0, 2)).unwrap().bg, Color::Blue);
        assert_ne!(buf.cell((0, 1)).unwrap().bg, Color::Blue);
    }

    #[test]
    fn scroll_offset_skips_rows() {
        let view = sample_view();
        let area = Rect::new(0, 0, 60, 2);
        let mut buf = Buffer::empty(area);
        TreeWidget::new(&view, 3, 3).render(area, &mut buf);

        assert!(row_text(&buf, 0, 60).contains("intro.mp3"));
        assert!(row_text(&buf, 1, 60).contains("outro.wav"));
    }

    #[test]
    fn zero_area_does_not_panic() {
        let view = sample_view();
        let area = Rect::new(0, 0, 0, 0);
        let mut buf = Buffer::empty(area);
        TreeWidget::new(&view, 0, 0).render(area, &mut buf);
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
