//! Premultiplied RGBA8 blending.

pub type PremulRgba8 = [u8; 4];

/// Converts a straight-alpha pixel to premultiplied form.
pub fn premultiply(px: [u8; 4]) -> PremulRgba8 {
    let a = u16::from(px[3]);
    [
        mul_div255(u16::from(px[0]), a),
        mul_div255(u16::from(px[1]), a),
        mul_div255(u16::from(px[2]), a),
        px[3],
    ]
}

/// Porter-Duff "source over destination" with an extra layer opacity.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255(u16::from(dst[3]), inv));
    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

/// Flattens a premultiplied buffer over opaque black, in place.
pub fn flatten_over_black(buf: &mut [u8]) {
    // Premultiplied colour over black is the colour itself.
    for px in buf.chunks_exact_mut(4) {
        px[3] = 255;
    }
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}
