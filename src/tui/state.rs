use crate::prompt::PromptSession;
use std::collections::BTreeSet;

/// Entries of the File menu, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    OpenImage,
    ClipboardCaption,
    CopyResult,
    ExportList,
    ImportList,
    Exit,
}

impl MenuItem {
    pub const ALL: [MenuItem; 6] = [
        MenuItem::OpenImage,
        MenuItem::ClipboardCaption,
        MenuItem::CopyResult,
        MenuItem::ExportList,
        MenuItem::ImportList,
        MenuItem::Exit,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MenuItem::OpenImage => "Open Image",
            MenuItem::ClipboardCaption => "Image2Text from clipboard",
            MenuItem::CopyResult => "Copy result to clipboard",
            MenuItem::ExportList => "Export List",
            MenuItem::ImportList => "Import List",
            MenuItem::Exit => "Exit",
        }
    }

    pub fn hotkey(self) -> char {
        match self {
            MenuItem::OpenImage => 'o',
            MenuItem::ClipboardCaption => 'v',
            MenuItem::CopyResult => 'y',
            MenuItem::ExportList => 'e',
            MenuItem::ImportList => 'i',
            MenuItem::Exit => 'q',
        }
    }

    pub fn from_hotkey(c: char) -> Option<MenuItem> {
        Self::ALL.into_iter().find(|item| item.hotkey() == c)
    }

    /// Separators are drawn after these entries.
    pub fn ends_group(self) -> bool {
        matches!(self, MenuItem::CopyResult | MenuItem::ImportList)
    }
}

/// What a path prompt is collecting a path for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathAction {
    OpenImage,
    ExportList,
    ImportList,
}

impl PathAction {
    pub fn title(self) -> &'static str {
        match self {
            PathAction::OpenImage => "Open Image",
            PathAction::ExportList => "Export List (.txt)",
            PathAction::ImportList => "Import List",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathInput {
    pub action: PathAction,
    pub buffer: String,
}

pub struct UiState {
    pub session: PromptSession,
    pub cursor: usize,
    pub selected: BTreeSet<usize>,
    pub info: String,
    pub busy: bool,
    pub model_label: String,
    pub menu_open: bool,
    pub menu_cursor: usize,
    pub input: Option<PathInput>,
    pub error: Option<String>,
    pub show_help: bool,
    pub last_list_path: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            session: PromptSession::new(),
            cursor: 0,
            selected: BTreeSet::new(),
            info: String::new(),
            busy: false,
            model_label: String::new(),
            menu_open: false,
            menu_cursor: 0,
            input: None,
            error: None,
            show_help: false,
            last_list_path: None,
        }
    }
}

impl UiState {
    pub fn move_cursor(&mut self, delta: isize) {
        let len = self.session.prompts().len();
        if len == 0 {
            self.cursor = 0;
            return;
        }
        let next = self.cursor as isize + delta;
        self.cursor = next.clamp(0, len as isize - 1) as usize;
    }

    pub fn toggle_selected(&mut self) {
        if self.cursor >= self.session.prompts().len() {
            return;
        }
        if !self.selected.remove(&self.cursor) {
            self.selected.insert(self.cursor);
        }
    }

    /// Select everything, or nothing if everything is already selected.
    pub fn toggle_select_all(&mut self) {
        let len = self.session.prompts().len();
        if self.selected.len() == len {
            self.selected.clear();
        } else {
            self.selected = (0..len).collect();
        }
    }

    /// Selected indices in list order, for merging.
    pub fn selected_indices(&self) -> Vec<usize> {
        self.selected.iter().copied().collect()
    }

    /// Drop selection state after the list was replaced or emptied.
    pub fn reset_list_view(&mut self) {
        self.selected.clear();
        self.cursor = 0;
    }

    pub fn open_input(&mut self, action: PathAction, initial: &str) {
        self.input = Some(PathInput {
            action,
            buffer: initial.to_string(),
        });
    }

    pub fn show_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(n: usize) -> UiState {
        let mut state = UiState::default();
        for i in 0..n {
            state.session.append(format!("prompt {i}, detail"));
        }
        state
    }

    #[test]
    fn test_cursor_is_clamped() {
        let mut state = state_with(3);
        state.move_cursor(10);
        assert_eq!(state.cursor, 2);
        state.move_cursor(-10);
        assert_eq!(state.cursor, 0);

        let mut empty = UiState::default();
        empty.move_cursor(1);
        assert_eq!(empty.cursor, 0);
    }

    #[test]
    fn test_selection_toggles_and_sorts() {
        let mut state = state_with(4);
        state.cursor = 3;
        state.toggle_selected();
        state.cursor = 1;
        state.toggle_selected();
        assert_eq!(state.selected_indices(), vec![1, 3]);
        state.toggle_selected();
        assert_eq!(state.selected_indices(), vec![3]);

        state.toggle_select_all();
        assert_eq!(state.selected_indices(), vec![0, 1, 2, 3]);
        state.toggle_select_all();
        assert!(state.selected.is_empty());
    }

    #[test]
    fn test_menu_hotkeys_are_unique() {
        for item in MenuItem::ALL {
            assert_eq!(MenuItem::from_hotkey(item.hotkey()), Some(item));
        }
        assert_eq!(MenuItem::from_hotkey('z'), None);
    }
}
