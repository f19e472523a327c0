//! Layer-ordered step texts.
//!
//! Some exported models list their steps in no useful order. This module
//! regroups the steps of a model text bottom-up: each step is placed by
//! the average height of the parts it places, steps whose heights are
//! within [`LAYER_EPSILON`] of each other are merged into one layer, and
//! every layer yields the model text up to and including it.
//!
//! The result is plain LDraw text, so each step is loaded like any other
//! model (e.g. through [`SceneLoader::load_override`](crate::SceneLoader::load_override)).

use crate::format::{parse_line, Directive};
use crate::types::{orientation_fix, BoundingBox};
use glam::Vec3;
use std::cmp::Ordering;

/// Height difference (LDraw units) under which two steps share a layer.
pub const LAYER_EPSILON: f32 = 8.0;

/// Cumulative texts, one per layer, plus the volume all placements span.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayeredSteps {
    /// `texts[0]` is the header (lines before the first step marker when
    /// they place nothing); each later entry adds one layer.
    pub texts: Vec<String>,
    /// Bounds of the type-1 placement positions, in LDraw coordinates.
    pub bounds: Option<BoundingBox>,
}

impl LayeredSteps {
    pub fn layer_count(&self) -> usize {
        self.texts.len().saturating_sub(1)
    }

    /// [`bounds`](Self::bounds) in scene coordinates (LDraw -Y up turned
    /// into +Y up), ready to be used as custom fit bounds.
    pub fn world_bounds(&self) -> Option<BoundingBox> {
        self.bounds.map(|b| b.transformed(&orientation_fix()))
    }
}

struct Segment<'a> {
    lines: Vec<&'a str>,
    /// Average placement height; `None` when nothing is placed.
    height: Option<f32>,
}

/// Split a model text at its step markers and regroup it by layer.
pub fn layer_steps<'a>(text: &'a str) -> LayeredSteps {
    let mut positions: Vec<Vec3> = Vec::new();
    let mut segments: Vec<Segment<'a>> = Vec::new();
    let mut lines: Vec<&str> = Vec::new();
    let mut heights: Vec<f32> = Vec::new();

    let mut flush = |lines: &mut Vec<&'a str>, heights: &mut Vec<f32>| {
        let height = (!heights.is_empty()).then(|| heights.iter().sum::<f32>() / heights.len() as f32);
        segments.push(Segment {
            lines: std::mem::take(lines),
            height,
        });
        heights.clear();
    };

    for raw in text.lines() {
        match parse_line(raw) {
            Ok(Some(directive)) if directive.is_step() => {
                flush(&mut lines, &mut heights);
                continue;
            }
            Ok(Some(Directive::SubFile(reference))) => {
                let position = reference.transform.w_axis.truncate();
                positions.push(position);
                heights.push(position.y);
            }
            _ => {}
        }
        lines.push(raw);
    }
    flush(&mut lines, &mut heights);

    let mut body: Vec<Segment> = segments;
    let header = if body.first().is_some_and(|s| !places_parts(s)) {
        body.remove(0).lines
    } else {
        Vec::new()
    };

    // LDraw -Y is up: the largest Y is the bottom layer
    body.sort_by(|a, b| match (a.height, b.height) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    let mut layers: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut layer_height: Option<f32> = None;
    for segment in body {
        let joins = match (layer_height, segment.height) {
            (None, _) => true,
            (Some(layer), Some(height)) => (height - layer).abs() < LAYER_EPSILON,
            (Some(_), None) => false,
        };
        if joins {
            current.extend(segment.lines);
            if layer_height.is_none() {
                layer_height = segment.height;
            }
        } else {
            layers.push(std::mem::replace(&mut current, segment.lines));
            layer_height = segment.height;
        }
    }
    if !current.is_empty() {
        layers.push(current);
    }

    let mut texts = Vec::with_capacity(layers.len() + 1);
    let mut accumulated: Vec<&str> = header;
    texts.push(accumulated.join("\n"));
    for layer in layers {
        accumulated.extend(layer);
        texts.push(accumulated.join("\n"));
    }

    LayeredSteps {
        texts,
        bounds: BoundingBox::from_points(positions),
    }
}

fn places_parts(segment: &Segment) -> bool {
    segment
        .lines
        .iter()
        .any(|line| line.trim_start().starts_with("1 "))
}
