//! Builders for movie requests and configuration JSON.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use heliomovie::api::{LayersParam, RoiParams, ScreenshotRequest, SubmitRequest};

/// 2014-02-03 00:00:00 UTC, the start of most test movies.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2014, 2, 3, 0, 0, 0).unwrap()
}

/// Builder for `SubmitRequest`.
pub struct SubmitBuilder {
    layers: String,
    roi: RoiParams,
    start_time: DateTime<Utc>,
    frame_rate: f64,
    num_frames: u32,
}

impl SubmitBuilder {
    /// One full-opacity layer, a 16x16 arcsec box at 1 arcsec/px, 10 fps.
    pub fn new() -> Self {
        Self {
            layers: "[14,1,100]".to_string(),
            roi: RoiParams {
                top: -8.0,
                left: -8.0,
                bottom: 8.0,
                right: 8.0,
                image_scale: 1.0,
            },
            start_time: epoch(),
            frame_rate: 10.0,
            num_frames: 7,
        }
    }

    pub fn layers(mut self, layers: &str) -> Self {
        self.layers = layers.to_string();
        self
    }

    pub fn roi(mut self, top: f64, left: f64, bottom: f64, right: f64, image_scale: f64) -> Self {
        self.roi = RoiParams {
            top,
            left,
            bottom,
            right,
            image_scale,
        };
        self
    }

    pub fn start_time(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = start;
        self
    }

    pub fn frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn num_frames(mut self, num_frames: u32) -> Self {
        self.num_frames = num_frames;
        self
    }

    pub fn build(self) -> SubmitRequest {
        SubmitRequest {
            layers: LayersParam::Wire(self.layers),
            roi: self.roi,
            start_time: self.start_time,
            frame_rate: self.frame_rate,
            num_frames: self.num_frames,
        }
    }

    pub fn screenshot(self) -> ScreenshotRequest {
        ScreenshotRequest {
            layers: LayersParam::Wire(self.layers),
            roi: self.roi,
            date: self.start_time,
        }
    }
}

/// Builder for config file JSON.
pub struct ConfigJsonBuilder {
    value: Value,
}

impl ConfigJsonBuilder {
    pub fn new(output_directory: &str) -> Self {
        Self {
            value: json!({
                "version": "1.0",
                "output_directory": output_directory,
            }),
        }
    }

    /// Sets a top-level key or a `section.key` pair.
    pub fn set(mut self, key: &str, value: Value) -> Self {
        match key.split_once('.') {
            Some((section, field)) => {
                let entry = self.value[section].take();
                let mut object = if entry.is_object() { entry } else { json!({}) };
                object[field] = value;
                self.value[section] = object;
            }
            None => self.value[key] = value,
        }
        self
    }

    pub fn build(self) -> String {
        serde_json::to_string_pretty(&self.value).unwrap()
    }
}
