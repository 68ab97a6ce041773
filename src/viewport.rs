// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The viewport controller: zoom, pan, fit, and annotation state for
//! presenting a rendered diagram interactively.
//!
//! Two coordinate systems are involved. *Screen* coordinates are pixels
//! within the host's viewport. *Diagram* coordinates are the intrinsic
//! coordinates of the rendered diagram. The current [`ViewportState`]
//! relates them:
//!
//! ```text
//! screen = diagram * zoom + pan
//! diagram = (screen - pan) / zoom
//! ```
//!
//! Annotations are stored in diagram coordinates, so they stay attached
//! to the content through any amount of panning and zooming.
//!
//! The controller knows nothing about any UI toolkit. The host reports
//! the viewport size, the diagram bounds, and pointer and keyboard
//! events, and reads back the state to draw.

use std::collections::BTreeMap;
use std::ops::{Add, Sub};

use serde::Serialize;

/// The minimum zoom factor.
pub const MIN_ZOOM: f64 = 0.1;

/// The maximum zoom factor.
pub const MAX_ZOOM: f64 = 8.0;

/// The zoom step applied by the keyboard shortcuts.
pub const KEY_ZOOM_STEP: f64 = 0.1;

/// A point (or a displacement) in screen or diagram coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// A width and height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Returns whether both dimensions are positive (and finite).
    pub fn is_usable(self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    fn center(self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

/// The transform from diagram to screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ViewportState {
    /// Always within [`MIN_ZOOM`]..=[`MAX_ZOOM`].
    pub zoom: f64,
    pub pan: Point,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan: Point::default(),
        }
    }
}

/// Clamps a zoom factor into the permitted range. Non-finite values
/// become 1.
pub fn clamp_zoom(zoom: f64) -> f64 {
    if zoom.is_finite() {
        zoom.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        1.0
    }
}

/// The active pointer tool.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Pan,
    Annotate,
}

/// A pointer button.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

/// What a pointer press did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerOutcome {
    /// A drag started.
    Dragging,

    /// The annotation tool was clicked at the given screen point. The
    /// host should collect the annotation text and then call
    /// [`ViewportController::place_annotation`].
    AnnotationRequested(Point),

    Ignored,
}

/// A note pinned to a point of the diagram.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Annotation {
    pub id: usize,

    /// In diagram coordinates.
    pub x: f64,
    pub y: f64,
    pub text: String,
}

struct Drag {
    start: Point,
    base_pan: Point,

    /// The tool to restore when the drag ends, if the drag forced the
    /// pan tool.
    restore_tool: Option<Tool>,
}

/// The viewport state machine.
pub struct ViewportController {
    state: ViewportState,
    viewport: Size,
    content: Option<Size>,
    fit_scale: f64,
    manually_adjusted: bool,
    full_window: bool,
    tool: Tool,
    drag: Option<Drag>,
    annotations: BTreeMap<usize, Annotation>,

    /// IDs are never reused, even after removal.
    next_annotation_id: usize,
}

impl ViewportController {
    /// Creates a controller for a viewport of the given size.
    pub fn new(viewport: Size) -> Self {
        Self {
            state: ViewportState::default(),
            viewport,
            content: None,
            fit_scale: 1.0,
            manually_adjusted: false,
            full_window: false,
            tool: Tool::default(),
            drag: None,
            annotations: BTreeMap::new(),
            next_annotation_id: 0,
        }
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    pub fn viewport_size(&self) -> Size {
        self.viewport
    }

    pub fn content_bounds(&self) -> Option<Size> {
        self.content
    }

    /// Returns whether the user has zoomed or panned since the view was
    /// last fitted.
    pub fn is_manually_adjusted(&self) -> bool {
        self.manually_adjusted
    }

    pub fn is_full_window(&self) -> bool {
        self.full_window
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    ////////////////////////////////////////////////////////////////////
    // GEOMETRY UPDATES                                               //
    ////////////////////////////////////////////////////////////////////

    /// Records a new viewport size, refitting unless the view has been
    /// manually adjusted.
    pub fn set_viewport_size(&mut self, size: Size) {
        if size == self.viewport {
            return;
        }
        self.viewport = size;
        if !self.manually_adjusted {
            self.fit_to_view();
        }
    }

    /// Records new diagram bounds (after a render), refitting unless the
    /// view has been manually adjusted.
    pub fn set_content_bounds(&mut self, bounds: Size) {
        if self.content == Some(bounds) {
            return;
        }
        self.content = Some(bounds);
        if !self.manually_adjusted {
            self.fit_to_view();
        }
    }

    ////////////////////////////////////////////////////////////////////
    // ZOOM AND PAN                                                   //
    ////////////////////////////////////////////////////////////////////

    /// Zooms by `delta`, anchored at the center of the viewport.
    pub fn zoom_by(&mut self, delta: f64) {
        let anchor = self.viewport.center();
        self.zoom_around(anchor, self.state.zoom + delta);
    }

    /// Zooms by `delta`, anchored at the pointer position (in screen
    /// coordinates). The diagram point under the pointer stays under
    /// the pointer.
    pub fn zoom_at_pointer(&mut self, delta: f64, pointer: Point) {
        self.zoom_around(pointer, self.state.zoom + delta);
    }

    /// Sets the zoom to `scale`, anchored at the center of the viewport.
    pub fn normalize_zoom_to(&mut self, scale: f64) {
        let anchor = self.viewport.center();
        self.zoom_around(anchor, scale);
    }

    /// Pans by `delta` screen pixels.
    pub fn pan_by(&mut self, delta: Point) {
        self.state.pan = self.state.pan + delta;
        self.manually_adjusted = true;
    }

    fn zoom_around(&mut self, anchor: Point, zoom: f64) {
        let old = self.state.zoom;
        let new = clamp_zoom(zoom);
        self.state.pan = Point::new(
            anchor.x - (anchor.x - self.state.pan.x) / old * new,
            anchor.y - (anchor.y - self.state.pan.y) / old * new,
        );
        self.state.zoom = new;
        self.manually_adjusted = true;
    }

    /// Fits the diagram into the viewport and centers it, clearing the
    /// manual-adjustment latch. Does nothing to the transform until
    /// both sizes are known.
    pub fn fit_to_view(&mut self) {
        self.manually_adjusted = false;
        let Some(content) = self.content else {
            return;
        };
        if !content.is_usable() || !self.viewport.is_usable() {
            return;
        }
        let scale = clamp_zoom(f64::min(
            self.viewport.width / content.width,
            self.viewport.height / content.height,
        ));
        self.fit_scale = scale;
        self.state = ViewportState {
            zoom: scale,
            pan: Point::new(
                (self.viewport.width - content.width * scale) / 2.0,
                (self.viewport.height - content.height * scale) / 2.0,
            ),
        };
    }

    /// Returns the scale chosen by the most recent fit.
    pub fn fit_scale(&self) -> f64 {
        self.fit_scale
    }

    /// Returns the zoom relative to the fitted scale, for display as a
    /// percentage.
    pub fn relative_zoom(&self) -> f64 {
        self.state.zoom / self.fit_scale
    }

    /// Toggles full-window presentation. The view is refitted and the
    /// manual-adjustment latch cleared.
    pub fn toggle_full_window(&mut self) {
        self.full_window = !self.full_window;
        self.drag = None;
        self.fit_to_view();
    }

    ////////////////////////////////////////////////////////////////////
    // POINTER AND KEYBOARD EVENTS                                    //
    ////////////////////////////////////////////////////////////////////

    /// Handles a pointer press at `point` (screen coordinates).
    ///
    /// The secondary button always starts a pan drag, temporarily
    /// switching to the pan tool; the previous tool is restored by
    /// [`ViewportController::pointer_up`].
    pub fn pointer_down(&mut self, button: PointerButton, point: Point) -> PointerOutcome {
        match (button, self.tool) {
            (PointerButton::Secondary, tool) => {
                self.tool = Tool::Pan;
                self.start_drag(point, Some(tool));
                PointerOutcome::Dragging
            }
            (PointerButton::Primary, Tool::Pan) => {
                self.start_drag(point, None);
                PointerOutcome::Dragging
            }
            (PointerButton::Primary, Tool::Annotate) => PointerOutcome::AnnotationRequested(point),
        }
    }

    fn start_drag(&mut self, start: Point, restore_tool: Option<Tool>) {
        self.drag = Some(Drag {
            start,
            base_pan: self.state.pan,
            restore_tool,
        });
    }

    /// Handles pointer movement. While dragging, the pan follows the
    /// pointer.
    pub fn pointer_move(&mut self, point: Point) {
        if let Some(drag) = &self.drag {
            self.state.pan = drag.base_pan + (point - drag.start);
            self.manually_adjusted = true;
        }
    }

    /// Handles a pointer release, ending any drag.
    pub fn pointer_up(&mut self) {
        if let Some(drag) = self.drag.take() {
            if let Some(tool) = drag.restore_tool {
                self.tool = tool;
            }
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Handles a key press. Returns whether the key was recognized.
    pub fn handle_key(&mut self, key: char) -> bool {
        match key {
            '+' | '=' => self.zoom_by(KEY_ZOOM_STEP),
            '-' => self.zoom_by(-KEY_ZOOM_STEP),
            '0' => self.fit_to_view(),
            'f' | 'F' => self.toggle_full_window(),
            _ => return false,
        }
        true
    }

    ////////////////////////////////////////////////////////////////////
    // ANNOTATIONS                                                    //
    ////////////////////////////////////////////////////////////////////

    /// Pins an annotation at the diagram point currently under the
    /// screen point `screen`. Returns the annotation's ID, or [`None`]
    /// if `text` is blank.
    pub fn place_annotation(&mut self, screen: Point, text: &str) -> Option<usize> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let at = self.screen_to_diagram(screen);
        let id = self.next_annotation_id;
        self.next_annotation_id += 1;
        self.annotations.insert(
            id,
            Annotation {
                id,
                x: at.x,
                y: at.y,
                text: text.to_owned(),
            },
        );
        Some(id)
    }

    pub fn remove_annotation(&mut self, id: usize) -> Option<Annotation> {
        self.annotations.remove(&id)
    }

    pub fn clear_annotations(&mut self) {
        self.annotations.clear();
    }

    /// Returns the annotations in placement order.
    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.values()
    }

    ////////////////////////////////////////////////////////////////////
    // COORDINATES                                                    //
    ////////////////////////////////////////////////////////////////////

    pub fn screen_to_diagram(&self, screen: Point) -> Point {
        Point::new(
            (screen.x - self.state.pan.x) / self.state.zoom,
            (screen.y - self.state.pan.y) / self.state.zoom,
        )
    }

    pub fn diagram_to_screen(&self, diagram: Point) -> Point {
        Point::new(
            diagram.x * self.state.zoom + self.state.pan.x,
            diagram.y * self.state.zoom + self.state.pan.y,
        )
    }

    /// Returns the transform as a CSS `transform` value, for hosts
    /// presenting the diagram in a web view.
    pub fn css_transform(&self) -> String {
        format!(
            "translate({}px, {}px) scale({})",
            self.state.pan.x, self.state.pan.y, self.state.zoom
        )
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
