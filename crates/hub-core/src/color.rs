//! Display color assignment.
//!
//! Random hue with fixed saturation and value, rendered as `#rrggbb`.

use rand::Rng;

const SATURATION: f64 = 0.8;
const VALUE: f64 = 0.8;

/// Pick a random display color.
pub fn random_color() -> String {
    let hue = rand::thread_rng().gen_range(0.0..360.0);
    hsv_to_hex(hue, SATURATION, VALUE)
}

/// Convert HSV (`h` in degrees, `s`/`v` in `[0, 1]`) to a hex string.
pub fn hsv_to_hex(h: f64, s: f64, v: f64) -> String {
    let h = h.rem_euclid(360.0);
    let c = v * s;
    let hp = h / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    format!(
        "#{:02x}{:02x}{:02x}",
        to_channel(r + m),
        to_channel(g + m),
        to_channel(b + m)
    )
}

fn to_channel(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_hues() {
        assert_eq!(hsv_to_hex(0.0, 1.0, 1.0), "#ff0000");
        assert_eq!(hsv_to_hex(120.0, 1.0, 1.0), "#00ff00");
        assert_eq!(hsv_to_hex(240.0, 1.0, 1.0), "#0000ff");
        assert_eq!(hsv_to_hex(360.0, 1.0, 1.0), "#ff0000");
    }

    #[test]
    fn fixed_saturation_and_value() {
        assert_eq!(hsv_to_hex(0.0, SATURATION, VALUE), "#cc2929");
    }

    #[test]
    fn random_color_is_hex() {
        for _ in 0..32 {
            let c = random_color();
            assert_eq!(c.len(), 7);
            assert!(c.starts_with('#'));
            assert!(c[1..].chars().all(|ch| ch.is_ascii_hexdigit()));
        }
    }
}
