// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Currently selected hour and its change notification.

use crate::hour::{DatasetDate, HourIndex};

type ChangeCallback = Box<dyn FnMut(HourIndex) + Send>;

/// Holds the single live hour selection.
///
/// Every `select` call invokes the change callback exactly once,
/// synchronously, even when the hour did not change. There is no debouncing.
pub struct TimeSelector {
    current: HourIndex,
    date: DatasetDate,
    on_change: Option<ChangeCallback>,
}

impl std::fmt::Debug for TimeSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeSelector")
            .field("current", &self.current)
            .field("date", &self.date)
            .field("has_callback", &self.on_change.is_some())
            .finish()
    }
}

impl TimeSelector {
    /// Create a selector at 00:00 of the given dataset day.
    #[must_use]
    pub fn new(date: DatasetDate) -> Self {
        Self::starting_at(date, HourIndex::MIN)
    }

    #[must_use]
    pub fn starting_at(date: DatasetDate, hour: HourIndex) -> Self {
        Self {
            current: hour,
            date,
            on_change: None,
        }
    }

    /// Register the change callback, replacing any previous one.
    pub fn on_change<F>(&mut self, callback: F)
    where
        F: FnMut(HourIndex) + Send + 'static,
    {
        self.on_change = Some(Box::new(callback));
    }

    /// Select an hour and notify.
    pub fn select(&mut self, hour: HourIndex) {
        self.current = hour;
        if let Some(callback) = self.on_change.as_mut() {
            callback(hour);
        }
    }

    /// Move the selection by `delta` hours, clamped to the day.
    ///
    /// Returns `false` (and does not notify) when the clamped hour equals
    /// the current one.
    pub fn step(&mut self, delta: i32) -> bool {
        let target = HourIndex::clamped(i64::from(self.current.value()) + i64::from(delta));
        if target == self.current {
            return false;
        }
        self.select(target);
        true
    }

    #[must_use]
    pub fn current(&self) -> HourIndex {
        self.current
    }

    #[must_use]
    pub fn date(&self) -> DatasetDate {
        self.date
    }

    /// Label for the current selection (`"2025/11/01 09:00"`).
    #[must_use]
    pub fn label(&self) -> String {
        self.date.selector_label(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_selector() -> (TimeSelector, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut selector = TimeSelector::new(DatasetDate::default());
        let sink = Arc::clone(&seen);
        selector.on_change(move |hour| sink.lock().unwrap().push(hour.value()));
        (selector, seen)
    }

    #[test]
    fn test_default_hour_is_zero() {
        let selector = TimeSelector::new(DatasetDate::default());
        assert_eq!(selector.current(), HourIndex::MIN);
        assert_eq!(selector.label(), "2025/11/01 00:00");
    }

    #[test]
    fn test_select_notifies_once_per_call() {
        let (mut selector, seen) = recording_selector();
        selector.select(HourIndex::new(3).unwrap());
        selector.select(HourIndex::new(9).unwrap());
        selector.select(HourIndex::new(9).unwrap());

        assert_eq!(*seen.lock().unwrap(), vec![3, 9, 9]);
        assert_eq!(selector.current().value(), 9);
        assert_eq!(selector.label(), "2025/11/01 09:00");
    }

    #[test]
    fn test_step_clamps_at_bounds() {
        let (mut selector, seen) = recording_selector();
        assert!(!selector.step(-1));
        assert!(selector.step(1));
        assert!(selector.step(40));
        assert!(!selector.step(1));

        assert_eq!(*seen.lock().unwrap(), vec![1, 23]);
        assert_eq!(selector.current(), HourIndex::MAX);
    }

    #[test]
    fn test_select_without_callback() {
        let mut selector = TimeSelector::new(DatasetDate::default());
        selector.select(HourIndex::new(12).unwrap());
        assert_eq!(selector.current().value(), 12);
    }
}
