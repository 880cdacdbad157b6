//! Fixed sensor layout templates.
//!
//! Positions are polar head-plane coordinates: `theta` in degrees from the
//! nose (positive towards the right ear) and `radius` where 0.5 sits on the
//! ear/nasion circumference.

use crate::signal::ChannelInfo;

/// Name of the only layout shipped with the loader.
pub const STANDARD_1020: &str = "standard_1020";

const STANDARD_1020_POLAR: &[(&str, f64, f64)] = &[
    ("Fp1", -18.0, 0.511),
    ("Fpz", 0.0, 0.511),
    ("Fp2", 18.0, 0.511),
    ("AF7", -36.0, 0.511),
    ("AF3", -23.0, 0.411),
    ("AFz", 0.0, 0.383),
    ("AF4", 23.0, 0.411),
    ("AF8", 36.0, 0.511),
    ("F7", -54.0, 0.511),
    ("F5", -49.0, 0.416),
    ("F3", -39.0, 0.333),
    ("F1", -22.0, 0.279),
    ("Fz", 0.0, 0.256),
    ("F2", 22.0, 0.279),
    ("F4", 39.0, 0.333),
    ("F6", 49.0, 0.416),
    ("F8", 54.0, 0.511),
    ("FT7", -72.0, 0.511),
    ("FC5", -69.0, 0.398),
    ("FC3", -62.0, 0.295),
    ("FC1", -46.0, 0.182),
    ("FCz", 0.0, 0.128),
    ("FC2", 46.0, 0.182),
    ("FC4", 62.0, 0.295),
    ("FC6", 69.0, 0.398),
    ("FT8", 72.0, 0.511),
    ("T7", -90.0, 0.511),
    ("T3", -90.0, 0.511),
    ("C5", -90.0, 0.383),
    ("C3", -90.0, 0.256),
    ("C1", -90.0, 0.128),
    ("Cz", 0.0, 0.0),
    ("C2", 90.0, 0.128),
    ("C4", 90.0, 0.256),
    ("C6", 90.0, 0.383),
    ("T8", 90.0, 0.511),
    ("T4", 90.0, 0.511),
    ("TP7", -108.0, 0.511),
    ("CP5", -111.0, 0.398),
    ("CP3", -118.0, 0.295),
    ("CP1", -134.0, 0.182),
    ("CPz", 180.0, 0.128),
    ("CP2", 134.0, 0.182),
    ("CP4", 118.0, 0.295),
    ("CP6", 111.0, 0.398),
    ("TP8", 108.0, 0.511),
    ("P7", -126.0, 0.511),
    ("T5", -126.0, 0.511),
    ("P5", -131.0, 0.416),
    ("P3", -141.0, 0.333),
    ("P1", -158.0, 0.279),
    ("Pz", 180.0, 0.256),
    ("P2", 158.0, 0.279),
    ("P4", 141.0, 0.333),
    ("P6", 131.0, 0.416),
    ("P8", 126.0, 0.511),
    ("T6", 126.0, 0.511),
    ("PO7", -144.0, 0.511),
    ("PO3", -157.0, 0.411),
    ("POz", 180.0, 0.383),
    ("PO4", 157.0, 0.411),
    ("PO8", 144.0, 0.511),
    ("O1", -162.0, 0.511),
    ("Oz", 180.0, 0.511),
    ("O2", 162.0, 0.511),
];

/// Cartesian head-plane position of a 10-20 electrode, if the template knows it.
pub fn standard_1020_position(name: &str) -> Option<[f64; 2]> {
    STANDARD_1020_POLAR
        .iter()
        .find(|(label, _, _)| label.eq_ignore_ascii_case(name.trim()))
        .map(|&(_, theta, radius)| {
            let rad = theta.to_radians();
            [radius * rad.sin(), radius * rad.cos()]
        })
}

/// Assigns template positions in place; returns the names the template lacks.
pub fn apply_standard_1020(channels: &mut [ChannelInfo]) -> Vec<String> {
    let mut missing = Vec::new();
    for channel in channels.iter_mut() {
        channel.position = standard_1020_position(&channel.name);
        if channel.position.is_none() {
            missing.push(channel.name.clone());
        }
    }
    missing
}
