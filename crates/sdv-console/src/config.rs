//! [`ConsoleConfig`] – everything the console needs to reach one vehicle.
//!
//! Every field carries a serde default so a partial TOML document (or none
//! at all) still yields a usable configuration. Persistence lives in the
//! `sdv-cli` configuration vault.

use serde::{Deserialize, Serialize};

/// Topic names of the logical streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicNames {
    #[serde(default = "default_goal_topic")]
    pub goal: String,
    #[serde(default = "default_cancel_topic")]
    pub cancel: String,
    #[serde(default = "default_pose_topic")]
    pub pose: String,
    #[serde(default = "default_velocity_topic")]
    pub velocity: String,
    /// Occupancy grid, consumed by the map renderer.
    #[serde(default = "default_map_topic")]
    pub map: String,
    /// Navigation action server, consumed by the map renderer.
    #[serde(default = "default_action_server")]
    pub action_server: String,
}

fn default_goal_topic() -> String {
    "/move_base_simple/goal".to_string()
}
fn default_cancel_topic() -> String {
    "/move_base/cancel".to_string()
}
fn default_pose_topic() -> String {
    "/scanmatch_odom".to_string()
}
fn default_velocity_topic() -> String {
    "/mobile_base/commands/velocity".to_string()
}
fn default_map_topic() -> String {
    "/map".to_string()
}
fn default_action_server() -> String {
    "/move_base".to_string()
}

impl Default for TopicNames {
    fn default() -> Self {
        Self {
            goal: default_goal_topic(),
            cancel: default_cancel_topic(),
            pose: default_pose_topic(),
            velocity: default_velocity_topic(),
            map: default_map_topic(),
            action_server: default_action_server(),
        }
    }
}

/// Speeds applied to a held direction, in m/s and rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeleopScales {
    #[serde(default = "default_linear_scale")]
    pub linear: f64,
    #[serde(default = "default_angular_scale")]
    pub angular: f64,
}

fn default_linear_scale() -> f64 {
    0.3
}
fn default_angular_scale() -> f64 {
    0.5
}

impl Default for TeleopScales {
    fn default() -> Self {
        Self {
            linear: default_linear_scale(),
            angular: default_angular_scale(),
        }
    }
}

/// Console configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Host running the rosbridge server on the vehicle.
    #[serde(default = "default_bridge_host")]
    pub bridge_host: String,

    #[serde(default = "default_bridge_port")]
    pub bridge_port: u16,

    /// Frame the goal poses are expressed in.
    #[serde(default = "default_frame_id")]
    pub frame_id: String,

    /// Edge of the square map surface, in pixels.
    #[serde(default = "default_map_width")]
    pub map_width: u32,

    // Tables last, so the TOML form stays valid.
    #[serde(default)]
    pub topics: TopicNames,

    #[serde(default)]
    pub teleop: TeleopScales,
}

fn default_bridge_host() -> String {
    "localhost".to_string()
}
fn default_bridge_port() -> u16 {
    9090
}
fn default_frame_id() -> String {
    "map".to_string()
}
fn default_map_width() -> u32 {
    640
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            bridge_host: default_bridge_host(),
            bridge_port: default_bridge_port(),
            frame_id: default_frame_id(),
            map_width: default_map_width(),
            topics: TopicNames::default(),
            teleop: TeleopScales::default(),
        }
    }
}

impl ConsoleConfig {
    /// WebSocket URL of the rosbridge server.
    pub fn endpoint(&self) -> String {
        format!("ws://{}:{}", self.bridge_host, self.bridge_port)
    }
}
