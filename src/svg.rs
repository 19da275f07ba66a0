//! SVG serialization.
//!
//! Polygons paint largest first (darker first on ties) so small bright
//! details land on top. Every filled polygon also gets a thin stroke in its
//! own paint, which hides the hairline gaps anti-aliasing leaves between
//! neighbours. Outline strokes come last, unfilled.

use kurbo::{BezPath, Point};

use crate::color::{hex, Rgb};
use crate::polygon::{Polygon, VectorState};

/// Width of the gap-hiding stroke on filled polygons.
const GAP_STROKE: f64 = 0.8;

/// Paint order: descending area, then ascending brightness.
pub fn render_order(polygons: &[Polygon]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..polygons.len()).collect();
    order.sort_by(|&a, &b| {
        let (pa, pb) = (&polygons[a], &polygons[b]);
        pb.area
            .total_cmp(&pa.area)
            .then_with(|| pa.brightness.total_cmp(&pb.brightness))
    });
    order
}

fn header(width: u32, height: u32) -> String {
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 {w} {h}\" width=\"{w}\" height=\"{h}\">\n",
        w = width,
        h = height
    )
}

fn points_attr(points: &[Point]) -> String {
    points
        .iter()
        .map(|p| format!("{},{}", p.x.round() as i64, p.y.round() as i64))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Serialize the current state. An empty state still yields a complete
/// document with the image's viewport.
pub fn polygons_to_svg(state: &VectorState, width: u32, height: u32) -> String {
    let order = render_order(&state.polygons);
    let mut out = header(width, height);

    // Gradient ids follow paint order.
    let mut gradient_ids = vec![None; state.polygons.len()];
    let mut defs = String::new();
    let mut next_id = 0;
    for &i in &order {
        let Some(g) = &state.polygons[i].paint.gradient else {
            continue;
        };
        let id = format!("g{}", next_id);
        next_id += 1;
        defs.push_str(&format!(
            "    <linearGradient id=\"{}\" gradientUnits=\"userSpaceOnUse\" x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\">\
             <stop offset=\"0%\" stop-color=\"{}\"/><stop offset=\"100%\" stop-color=\"{}\"/></linearGradient>\n",
            id,
            g.start.x,
            g.start.y,
            g.end.x,
            g.end.y,
            hex(g.start_color),
            hex(g.end_color)
        ));
        gradient_ids[i] = Some(id);
    }
    if !defs.is_empty() {
        out.push_str("  <defs>\n");
        out.push_str(&defs);
        out.push_str("  </defs>\n");
    }

    for &i in &order {
        let poly = &state.polygons[i];
        if poly.opacity < 0.01 {
            continue;
        }
        let paint = match &gradient_ids[i] {
            Some(id) => format!("url(#{})", id),
            None => hex(poly.paint.color),
        };
        let opacity = if poly.opacity < 0.99 {
            format!(" fill-opacity=\"{}\"", poly.opacity)
        } else {
            String::new()
        };
        out.push_str(&format!(
            "  <polygon points=\"{}\" fill=\"{}\" stroke=\"{}\" stroke-width=\"{}\" stroke-linejoin=\"round\"{}/>\n",
            points_attr(&poly.points),
            paint,
            paint,
            GAP_STROKE,
            opacity
        ));
    }

    for &i in &order {
        let poly = &state.polygons[i];
        let Some(stroke) = state.strokes.get(&poly.region_id) else {
            continue;
        };
        out.push_str(&format!(
            "  <polygon points=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{}\" stroke-linejoin=\"round\"/>\n",
            points_attr(&poly.points),
            hex(stroke.color),
            stroke.width
        ));
    }

    out.push_str("</svg>\n");
    out
}

/// One colour of a quantized image: compound paths (outer ring plus holes).
#[derive(Debug, Clone)]
pub struct Layer {
    pub color: Rgb,
    pub paths: Vec<BezPath>,
    pub total_area: f64,
    pub brightness: f64,
}

/// Serialize quantized layers as even-odd compound paths, in the given order.
pub fn layers_to_svg(layers: &[Layer], width: u32, height: u32) -> String {
    let mut out = header(width, height);
    for layer in layers {
        let fill = hex(layer.color);
        for path in &layer.paths {
            out.push_str(&format!(
                "  <path d=\"{}\" fill=\"{}\" fill-rule=\"evenodd\" stroke=\"{}\" stroke-width=\"0.3\" stroke-linejoin=\"round\"/>\n",
                path.to_svg(),
                fill,
                fill
            ));
        }
    }
    out.push_str("</svg>\n");
    out
}
