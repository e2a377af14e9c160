use std::collections::HashMap;

use spatial_core::ColorProfile;

pub const COLOR_CHANNELS: [&str; 3] = ["Red", "Green", "Blue"];

const MAX_8BIT: f64 = 255.0;

/// True when all three RGB channels are listed (case-insensitive).
pub fn has_rgb_channels<S: AsRef<str>>(channels: &[S]) -> bool {
    COLOR_CHANNELS.iter().all(|wanted| {
        channels
            .iter()
            .any(|c| c.as_ref().trim().eq_ignore_ascii_case(wanted))
    })
}

/// Decides whether color exists and whether it needs rescaling to 8 bits.
/// `maxima` holds sampled per-channel maxima keyed by channel name.
pub fn inspect<S: AsRef<str>>(channels: &[S], maxima: &HashMap<String, f64>) -> ColorProfile {
    if !has_rgb_channels(channels) {
        return ColorProfile::none();
    }
    let is_16bit = maxima
        .iter()
        .filter(|(name, _)| COLOR_CHANNELS.iter().any(|c| name.eq_ignore_ascii_case(c)))
        .any(|(_, max)| *max > MAX_8BIT);

    log::info!("color profile: has_color=true is_16bit={is_16bit}");
    ColorProfile {
        has_color: true,
        is_16bit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maxima(values: &[(&str, f64)]) -> HashMap<String, f64> {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn no_rgb_channels_means_no_color() {
        let profile = inspect(&["X", "Y", "Z", "Intensity"], &maxima(&[("Intensity", 4000.0)]));
        assert_eq!(profile, ColorProfile::none());
    }

    #[test]
    fn partial_rgb_is_not_color() {
        assert!(!has_rgb_channels(&["X", "Red", "Green"]));
    }

    #[test]
    fn eight_bit_color() {
        let profile = inspect(
            &["X", "Y", "Z", "red", "green", "blue"],
            &maxima(&[("Red", 255.0), ("Green", 200.0), ("Blue", 0.0)]),
        );
        assert_eq!(profile, ColorProfile::rgb8());
    }

    #[test]
    fn any_channel_above_255_is_16_bit() {
        let profile = inspect(
            &["Red", "Green", "Blue"],
            &maxima(&[("Red", 255.0), ("Green", 256.0), ("Blue", 0.0)]),
        );
        assert_eq!(profile, ColorProfile::rgb16());
    }

    #[test]
    fn other_dimensions_do_not_affect_depth() {
        let profile = inspect(
            &["Red", "Green", "Blue", "Intensity"],
            &maxima(&[("Intensity", 65535.0), ("Red", 10.0)]),
        );
        assert!(!profile.is_16bit);
    }
}
