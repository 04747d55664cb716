use crate::actions::Action;

/// Working copy of a session's actions.
///
/// Every operation addresses actions by position. Out-of-range indices are
/// ignored and reported through the `bool` return value. Timestamps are never
/// rewritten, so gaps left by deletions stay in the timeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionEditor {
    actions: Vec<Action>,
}

impl ActionEditor {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn set_actions(&mut self, actions: Vec<Action>) {
        self.actions = actions;
    }

    pub fn get_actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn into_actions(self) -> Vec<Action> {
        self.actions
    }

    pub fn get(&self, index: usize) -> Option<&Action> {
        self.actions.get(index)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn delete_action(&mut self, index: usize) -> bool {
        if index >= self.actions.len() {
            return false;
        }
        self.actions.remove(index);
        true
    }

    /// Insert before `index`; an index past the end appends.
    pub fn insert_action(&mut self, index: usize, action: Action) -> bool {
        let index = index.min(self.actions.len());
        self.actions.insert(index, action);
        true
    }

    /// Swap with the previous action. No-op for the first one.
    pub fn move_up(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.actions.len() {
            return false;
        }
        self.actions.swap(index - 1, index);
        true
    }

    /// Swap with the next action. No-op for the last one.
    pub fn move_down(&mut self, index: usize) -> bool {
        if index >= self.actions.len().saturating_sub(1) {
            return false;
        }
        self.actions.swap(index, index + 1);
        true
    }
}
