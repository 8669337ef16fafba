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

use egui::{Color32, FontId, Key};
use layer_sync::{HourIndex, TimeSelector, HOURS_PER_DAY};

/// Windows at most this wide get sparser hour markers
pub const NARROW_WIDTH: f32 = 768.0;

/// Every how many hours a marker carries a label
pub fn marker_interval(window_width: f32) -> u8 {
    if window_width <= NARROW_WIDTH {
        12
    } else {
        6
    }
}

/// Marker text for an hour, empty between labelled hours
pub fn marker_text(hour: HourIndex, window_width: f32) -> String {
    if hour.value() % marker_interval(window_width) == 0 {
        format!("{:02}", hour.value())
    } else {
        String::new()
    }
}

/// Draw the hour slider and feed changes into the selector.
///
/// Each discrete value change results in exactly one `select`. Left and
/// Right arrow keys step the hour while the slider itself is not focused.
pub fn show(ui: &mut egui::Ui, selector: &mut TimeSelector) {
    let window_width = ui.ctx().screen_rect().width();

    ui.vertical(|ui| {
        ui.label(
            egui::RichText::new(format!("UTC {}", selector.label()))
                .font(FontId::proportional(14.0))
                .color(Color32::WHITE)
                .strong(),
        );

        let mut value = selector.current().value();
        let response = ui
            .horizontal(|ui| {
                ui.label(egui::RichText::new("00:00").color(Color32::from_rgb(180, 180, 180)));
                ui.spacing_mut().slider_width = (ui.available_width() - 50.0).max(120.0);
                let response = ui.add(
                    egui::Slider::new(&mut value, 0..=HOURS_PER_DAY - 1)
                        .show_value(false)
                        .step_by(1.0),
                );
                ui.label(egui::RichText::new("23:00").color(Color32::from_rgb(180, 180, 180)));
                response
            })
            .inner;

        if response.changed() {
            if let Some(hour) = HourIndex::new(value) {
                selector.select(hour);
            }
        }

        if !response.has_focus() {
            let (left, right) = ui
                .ctx()
                .input(|i| (i.key_pressed(Key::ArrowLeft), i.key_pressed(Key::ArrowRight)));
            if left {
                selector.step(-1);
            }
            if right {
                selector.step(1);
            }
        }

        draw_markers(ui, response.rect, selector.current(), window_width);
    });
}

fn draw_markers(
    ui: &mut egui::Ui,
    slider_rect: egui::Rect,
    current: HourIndex,
    window_width: f32,
) {
    let (rect, _) =
        ui.allocate_exact_size(egui::vec2(slider_rect.width(), 14.0), egui::Sense::hover());
    let painter = ui.painter();
    let left = slider_rect.left();
    let span = slider_rect.width();

    for hour in HourIndex::all() {
        let x = left + span * f32::from(hour.value()) / f32::from(HOURS_PER_DAY - 1);
        let active = hour == current;
        let color = if active {
            Color32::from_rgb(255, 220, 120)
        } else {
            Color32::from_rgb(150, 150, 150)
        };

        painter.line_segment(
            [egui::pos2(x, rect.top()), egui::pos2(x, rect.top() + 3.0)],
            egui::Stroke::new(1.0, color),
        );
        let text = marker_text(hour, window_width);
        if !text.is_empty() {
            painter.text(
                egui::pos2(x, rect.top() + 4.0),
                egui::Align2::CENTER_TOP,
                text,
                FontId::proportional(9.0),
                color,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_interval_by_width() {
        assert_eq!(marker_interval(1280.0), 6);
        assert_eq!(marker_interval(768.0), 12);
        assert_eq!(marker_interval(400.0), 12);
    }

    #[test]
    fn test_marker_text() {
        let labelled: Vec<String> = HourIndex::all()
            .map(|hour| marker_text(hour, 1280.0))
            .filter(|text| !text.is_empty())
            .collect();
        assert_eq!(labelled, vec!["00", "06", "12", "18"]);

        let narrow: Vec<String> = HourIndex::all()
            .map(|hour| marker_text(hour, 600.0))
            .filter(|text| !text.is_empty())
            .collect();
        assert_eq!(narrow, vec!["00", "12"]);
    }
}
