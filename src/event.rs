use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone)]
pub enum Event {
    Init,
    Render,
    Key(KeyEvent),
    Paste(String),
}

impl Event {
    /// `Init` paints the first frame without waiting for a render tick.
    pub fn is_draw(&self) -> bool {
        matches!(self, Event::Init | Event::Render)
    }

    /// Ctrl-c aborts without printing a selection.
    pub fn is_quit(&self) -> bool {
        matches!(
            self,
            Event::Key(KeyEvent {
                code: KeyCode::Char('c'),
                modifiers: KeyModifiers::CONTROL,
                ..
            })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctrl_c_quits() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(Event::Key(key).is_quit());
    }

    #[test]
    fn init_and_render_draw() {
        assert!(Event::Init.is_draw());
        assert!(Event::Render.is_draw());
        let key = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE);
        assert!(!Event::Key(key).is_draw());
        assert!(!Event::Paste("x".into()).is_draw());
    }

    #[test]
    fn plain_c_is_input() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE);
        assert!(!Event::Key(key).is_quit());
        assert!(!Event::Paste("c".into()).is_quit());
    }
}
