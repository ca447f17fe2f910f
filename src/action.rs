use crate::types::CollectionSelector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Leave and print the selection.
    Quit,
    ScrollUp,
    ScrollDown,
    PageUp,
    PageDown,
    GoToTop,
    GoToBottom,
    ToggleSelected,

    // Search input
    Input(char),
    Paste(String),
    Backspace,
    ClearInput,

    // Controller commands
    SetCollection(CollectionSelector),
    Refresh,
    Retry,
    ClearError,

    None,
}
