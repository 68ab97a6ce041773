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

//! The boundary with the external diagram renderer.
//!
//! Rendering Mermaid source is not done by this crate. The host
//! supplies a [`Renderer`], and the [`RenderState`] tracks its most
//! recent successful output along with any failure since.

use std::fmt;

use log::warn;

use crate::viewport::Size;

/// The output of a successful render.
#[derive(Clone, Debug, PartialEq)]
pub struct Rendered {
    /// The rendered diagram as SVG markup.
    pub svg: String,

    /// A raster rendering, if the renderer produces one.
    pub png: Option<Vec<u8>>,

    /// The intrinsic size of the diagram.
    pub bounds: Size,
}

/// An error from the external renderer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RenderError {
    /// The renderer rejected the diagram source.
    Rejected(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Rejected(message) => write!(f, "the diagram could not be rendered: {}", message),
        }
    }
}

impl std::error::Error for RenderError {}

/// An external diagram renderer.
pub trait Renderer {
    fn render(&self, source: &str) -> Result<Rendered, RenderError>;
}

impl<F> Renderer for F
where
    F: Fn(&str) -> Result<Rendered, RenderError>,
{
    fn render(&self, source: &str) -> Result<Rendered, RenderError> {
        self(source)
    }
}

/// The rendering state of a diagram view.
///
/// A failed render records the error but keeps the last good output in
/// place, so that the host can keep showing it.
#[derive(Clone, Debug, Default)]
pub struct RenderState {
    last_good: Option<Rendered>,
    error: Option<RenderError>,
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders `source` with `renderer`, updating the state. Returns
    /// the new output if rendering succeeded.
    pub fn update(&mut self, renderer: &impl Renderer, source: &str) -> Option<&Rendered> {
        match renderer.render(source) {
            Ok(rendered) => {
                self.error = None;
                self.last_good = Some(rendered);
                self.last_good.as_ref()
            }
            Err(e) => {
                warn!("{}", e);
                self.error = Some(e);
                None
            }
        }
    }

    /// Returns the most recent successful output.
    pub fn rendered(&self) -> Option<&Rendered> {
        self.last_good.as_ref()
    }

    /// Returns the error of the most recent render, if it failed.
    pub fn error(&self) -> Option<&RenderError> {
        self.error.as_ref()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer(source: &str) -> Result<Rendered, RenderError> {
        if source.contains("bad") {
            Err(RenderError::Rejected("syntax error".into()))
        } else {
            Ok(Rendered {
                svg: format!("<svg>{}</svg>", source),
                png: None,
                bounds: Size::new(100.0, 50.0),
            })
        }
    }

    #[test]
    fn failures_keep_last_good_output() {
        let mut state = RenderState::new();
        assert!(state.update(&renderer, "flowchart LR").is_some());
        assert!(state.error().is_none());

        assert!(state.update(&renderer, "bad").is_none());
        assert_eq!(
            state.error(),
            Some(&RenderError::Rejected("syntax error".into()))
        );
        assert_eq!(state.rendered().unwrap().svg, "<svg>flowchart LR</svg>");

        state.update(&renderer, "flowchart TD");
        assert!(state.error().is_none());
        assert_eq!(state.rendered().unwrap().svg, "<svg>flowchart TD</svg>");
    }
}
