use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc;

use crate::action::Action;
use crate::cache::SessionCache;
use crate::controller::{ControllerConfig, ControllerMsg, ControllerState, SearchController, Track};
use crate::event::Event;
use crate::fetcher::PagedFetcher;
use crate::types::Member;

/// Rows from the end of the list at which the next page is requested.
const LOAD_MORE_THRESHOLD: usize = 5;
const PAGE_JUMP: usize = 10;

pub struct App {
    pub controller: SearchController<Member>,
    /// Raw search input as typed.
    pub input: String,
    pub index: usize,
    pub selected: Vec<Member>,
    pub should_quit: bool,
    /// Which list `index` points into.
    view: (Track, String),
}

impl App {
    pub fn new(
        fetcher: Arc<dyn PagedFetcher<Member>>,
        config: ControllerConfig,
        cache: SessionCache<Member>,
        msg_tx: mpsc::UnboundedSender<ControllerMsg<Member>>,
    ) -> Self {
        let controller = SearchController::new(fetcher, config, cache, msg_tx);
        let input = controller.state().current_search_query.clone();
        let view = (controller.active_track(), input.clone());
        Self {
            controller,
            input,
            index: 0,
            selected: Vec::new(),
            should_quit: false,
            view,
        }
    }

    pub fn state(&self) -> &ControllerState<Member> {
        self.controller.state()
    }

    /// Members of whichever track is on screen.
    pub fn visible(&self) -> &[Member] {
        self.state().items(self.controller.active_track())
    }

    pub fn is_selected(&self, member: &Member) -> bool {
        self.selected.iter().any(|m| m.id == member.id)
    }

    pub fn handle_event(&self, event: Event) -> Action {
        match event {
            Event::Key(key) => self.handle_key(key),
            Event::Paste(text) => Action::Paste(text),
            _ => Action::None,
        }
    }

    fn handle_key(&self, key: KeyEvent) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('n') => Action::ScrollDown,
                KeyCode::Char('p') => Action::ScrollUp,
                KeyCode::Char('d') => Action::PageDown,
                KeyCode::Char('u') => Action::ClearInput,
                KeyCode::Char('r') => Action::Refresh,
                KeyCode::Char('t') => Action::Retry,
                KeyCode::Char('e') => Action::ClearError,
                _ => Action::None,
            };
        }

        match key.code {
            KeyCode::Esc => {
                if self.input.is_empty() {
                    Action::Quit
                } else {
                    Action::ClearInput
                }
            }
            KeyCode::Enter => Action::ToggleSelected,
            KeyCode::Down => Action::ScrollDown,
            KeyCode::Up => Action::ScrollUp,
            KeyCode::PageDown => Action::PageDown,
            KeyCode::PageUp => Action::PageUp,
            KeyCode::Home => Action::GoToTop,
            KeyCode::End => Action::GoToBottom,
            KeyCode::Tab => Action::SetCollection(self.controller.selector().toggled()),
            KeyCode::Backspace => Action::Backspace,
            KeyCode::Char(c) => Action::Input(c),
            _ => Action::None,
        }
    }

    pub fn update(&mut self, action: Action) {
        match action {
            Action::Quit => {
                self.should_quit = true;
            }
            Action::ScrollUp => {
                self.index = self.index.saturating_sub(1);
            }
            Action::ScrollDown => {
                self.index = self.index.saturating_add(1);
                self.maybe_load_more();
            }
            Action::PageUp => {
                self.index = self.index.saturating_sub(PAGE_JUMP);
            }
            Action::PageDown => {
                self.index = self.index.saturating_add(PAGE_JUMP);
                self.maybe_load_more();
            }
            Action::GoToTop => {
                self.index = 0;
            }
            Action::GoToBottom => {
                self.index = usize::MAX;
                self.maybe_load_more();
            }
            Action::ToggleSelected => {
                if let Some(member) = self.visible().get(self.index).cloned() {
                    if self.is_selected(&member) {
                        self.selected.retain(|m| m.id != member.id);
                    } else {
                        self.selected.push(member);
                    }
                }
            }
            Action::Input(c) => {
                self.input.push(c);
                self.controller.set_query(self.input.clone());
            }
            Action::Paste(text) => {
                self.input
                    .extend(text.chars().map(|c| if c.is_control() { ' ' } else { c }));
                self.controller.set_query(self.input.clone());
            }
            Action::Backspace => {
                if self.input.pop().is_some() {
                    self.controller.set_query(self.input.clone());
                }
            }
            Action::ClearInput => {
                self.input.clear();
                self.controller.clear_search();
            }
            Action::SetCollection(selector) => {
                self.controller.set_collection_selector(selector);
                self.index = 0;
            }
            Action::Refresh => {
                self.controller.refresh();
            }
            Action::Retry => {
                self.controller.retry();
            }
            Action::ClearError => {
                self.controller.clear_error();
            }
            Action::None => {}
        }
        self.sync_view();
    }

    /// Apply a message from the controller's background tasks.
    pub fn on_controller_msg(&mut self, msg: ControllerMsg<Member>) {
        self.controller.update(msg);
        self.sync_view();
        // A short first page may not fill the screen; keep paging while
        // nothing has gone wrong.
        if self.state().error.is_none() {
            self.maybe_load_more();
        }
    }

    /// Keep `index` inside the visible list, jumping back to the top when
    /// the list is swapped for another one.
    fn sync_view(&mut self) {
        let view = (
            self.controller.active_track(),
            self.state().current_search_query.clone(),
        );
        if view != self.view {
            self.view = view;
            self.index = 0;
        }
        let len = self.visible().len();
        self.index = self.index.min(len.saturating_sub(1));
    }

    fn maybe_load_more(&mut self) {
        let len = self.visible().len();
        if self.index.saturating_add(LOAD_MORE_THRESHOLD) >= len {
            self.controller.load_next_page();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::demo::Demo;
    use crate::types::CollectionSelector;

    fn app(members: usize, page_size: u32) -> (App, mpsc::UnboundedReceiver<ControllerMsg<Member>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = ControllerConfig {
            page_size,
            ..ControllerConfig::default()
        };
        let fetcher = Arc::new(Demo::generated(members, Duration::from_millis(50)));
        (App::new(fetcher, config, SessionCache::new(), tx), rx)
    }

    async fn settle(app: &mut App, rx: &mut mpsc::UnboundedReceiver<ControllerMsg<Member>>) {
        while let Ok(Some(msg)) = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            app.on_controller_msg(msg);
        }
    }

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(c: char) -> Event {
        Event::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
    }

    #[tokio::test(start_paused = true)]
    async fn key_bindings() {
        let (mut app, _rx) = app(10, 5);

        assert_eq!(app.handle_event(key(KeyCode::Esc)), Action::Quit);
        assert_eq!(app.handle_event(key(KeyCode::Char('r'))), Action::Input('r'));
        assert_eq!(app.handle_event(ctrl('r')), Action::Refresh);
        assert_eq!(app.handle_event(ctrl('t')), Action::Retry);
        assert_eq!(app.handle_event(ctrl('e')), Action::ClearError);
        assert_eq!(app.handle_event(key(KeyCode::Enter)), Action::ToggleSelected);
        assert_eq!(
            app.handle_event(key(KeyCode::Tab)),
            Action::SetCollection(CollectionSelector::MembersNotInFamily)
        );
        assert_eq!(app.handle_event(Event::Render), Action::None);

        app.update(Action::Input('a'));
        assert_eq!(app.handle_event(key(KeyCode::Esc)), Action::ClearInput);
    }

    #[tokio::test(start_paused = true)]
    async fn loads_first_page_on_start() {
        let (mut app, mut rx) = app(30, 10);
        assert!(app.state().is_loading_recent);

        settle(&mut app, &mut rx).await;
        assert_eq!(app.visible().len(), 10);
        assert!(!app.state().is_loading_recent);
    }

    #[tokio::test(start_paused = true)]
    async fn scrolling_to_the_end_pages_in_more() {
        let (mut app, mut rx) = app(30, 10);
        settle(&mut app, &mut rx).await;

        app.update(Action::GoToBottom);
        assert_eq!(app.index, 9);
        assert!(app.state().is_loading_more);

        settle(&mut app, &mut rx).await;
        assert_eq!(app.visible().len(), 20);
        assert_eq!(app.index, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn typing_searches_and_clearing_restores_recent() {
        let (mut app, mut rx) = app(24, 10);
        settle(&mut app, &mut rx).await;
        app.update(Action::ScrollDown);
        app.update(Action::ScrollDown);
        assert_eq!(app.index, 2);

        for c in "meera".chars() {
            app.update(Action::Input(c));
        }
        settle(&mut app, &mut rx).await;
        assert_eq!(app.controller.active_track(), Track::Search);
        assert_eq!(app.visible().len(), 2);
        assert_eq!(app.index, 0);

        app.update(Action::ClearInput);
        assert!(app.input.is_empty());
        assert_eq!(app.controller.active_track(), Track::Recent);
        assert_eq!(app.visible().len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn enter_toggles_selection() {
        let (mut app, mut rx) = app(10, 10);
        settle(&mut app, &mut rx).await;

        app.update(Action::ScrollDown);
        app.update(Action::ToggleSelected);
        assert_eq!(app.selected.len(), 1);
        assert_eq!(app.selected[0].id, "m0002");

        app.update(Action::ToggleSelected);
        assert!(app.selected.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pasted_newlines_become_spaces() {
        let (mut app, _rx) = app(10, 10);
        app.update(Action::Paste("asha\nsharma".into()));
        assert_eq!(app.input, "asha sharma");
    }
}
