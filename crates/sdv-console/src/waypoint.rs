//! Named waypoints of the lab floor.
//!
//! A fixed table from the label shown in the waypoint selector to the goal
//! pose sent when it is picked. Lookups are pure.

use sdv_types::GoalTarget;

/// `(label, x, y, orientation z, orientation w)`
const WAYPOINTS: &[(&str, f64, f64, f64, f64)] = &[
    ("Celda Experimental", 0.8, 5.8, 0.0, 0.1),
    ("Celda de Prototipado", 0.7067, -2.9218, 0.69, 0.715),
    ("Celda Industrial", 6.76584243774, 3.13956570625, 1.0, 0.0),
    ("Home", 0.0, 0.0, 0.0, 1.0),
    ("Centro de estudio", 2.68, 2.99, 0.0, 0.999),
];

/// Goal pose for `label`, or `None` when the label is not in the table.
///
/// Matching is exact after trimming surrounding whitespace.
pub fn lookup(label: &str) -> Option<GoalTarget> {
    let label = label.trim();
    WAYPOINTS
        .iter()
        .find(|(name, ..)| *name == label)
        .map(|&(_, x, y, orientation_z, orientation_w)| GoalTarget {
            x,
            y,
            orientation_z,
            orientation_w,
        })
}

/// Every label, in selector order.
pub fn labels() -> impl Iterator<Item = &'static str> {
    WAYPOINTS.iter().map(|(name, ..)| *name)
}
