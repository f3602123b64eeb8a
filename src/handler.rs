use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::App;

/// Handle a key event. Tree operations run in the background and report
/// failures through the event channel.
pub fn handle_key_event(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.quit(),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => app.quit(),
        KeyCode::Char('j') | KeyCode::Down => app.select_next(),
        KeyCode::Char('k') | KeyCode::Up => app.select_previous(),
        KeyCode::Char('g') | KeyCode::Home => app.select_first(),
        KeyCode::Char('G') | KeyCode::End => app.select_last(),
        KeyCode::Char('l') | KeyCode::Right | KeyCode::Enter => {
            app.expand_selected();
        }
        KeyCode::Char('h') | KeyCode::Left => app.collapse_selected(),
        KeyCode::Char('o') => {
            app.reroot_selected();
        }
        KeyCode::Backspace => {
            app.reroot_parent();
        }
        KeyCode::Char('r') => {
            app.refresh_selected();
        }
        KeyCode::Char('.') => {
            app.toggle_hidden();
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::fs::access::LocalFs;
    use crate::fs::expander::{Expander, ExpanderSettings};
    use crate::tags::NoTags;
    use std::fs::{self, File};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    async fn setup() -> (TempDir, App, mpsc::UnboundedReceiver<Event>) {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("crates")).unwrap();
        File::create(dir.path().join("crates").join("deep.mp3")).unwrap();
        File::create(dir.path().join("intro.mp3")).unwrap();
        let expander = Expander::new(
            Arc::new(LocalFs::new()),
            Arc::new(NoTags),
            ExpanderSettings::default(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let mut app = App::new(expander, tx, None);
        app.select_root(dir.path().to_path_buf()).await.unwrap();
        app.sync_view();
        (dir, app, rx)
    }

    #[tokio::test]
    async fn quit_keys() {
        let (_dir, mut app, _rx) = setup().await;
        handle_key_event(&mut app, key(KeyCode::Char('q')));
        assert!(app.should_quit);

        let (_dir, mut app, _rx) = setup().await;
        handle_key_event(
            &mut app,
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
        );
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn navigation_keys_move_selection() {
        let (_dir, mut app, _rx) = setup().await;
        handle_key_event(&mut app, key(KeyCode::Char('j')));
        assert_eq!(app.selected_index, 1);
        handle_key_event(&mut app, key(KeyCode::Down));
        assert_eq!(app.selected_index, 2);
        handle_key_event(&mut app, key(KeyCode::Up));
        assert_eq!(app.selected_index, 1);
        handle_key_event(&mut app, key(KeyCode::Char('G')));
        assert_eq!(app.selected_index, app.view.rows.len() - 1);
        handle_key_event(&mut app, key(KeyCode::Char('g')));
        assert_eq!(app.selected_index, 0);
    }

    #[tokio::test]
    async fn left_on_file_jumps_to_parent() {
        let (_dir, mut app, _rx) = setup().await;
        handle_key_event(&mut app, key(KeyCode::Char('G')));
        handle_key_event(&mut app, key(KeyCode::Left));
        assert_eq!(app.selected_index, 0);
    }

    #[tokio::test]
    async fn unmapped_key_does_nothing() {
        let (_dir, mut app, _rx) = setup().await;
        handle_key_event(&mut app, key(KeyCode::Char('z')));
        assert_eq!(app.selected_index, 0);
        assert!(!app.should_quit);
    }
}
