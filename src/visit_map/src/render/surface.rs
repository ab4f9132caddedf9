//! Drawing primitives and their SVG implementation.

use std::fmt::Write as _;

/// Fill and stroke for shapes. `"none"` disables either.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paint<'a> {
    pub fill: &'a str,
    pub stroke: &'a str,
    pub stroke_width: f64,
    pub opacity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle<'a> {
    pub fill: &'a str,
    pub font_family: &'a str,
    pub font_size: f64,
    pub bold: bool,
}

/// What the renderer needs from an output format.
pub trait DrawingSurface {
    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, paint: Paint<'_>);
    fn circle(&mut self, cx: f64, cy: f64, r: f64, paint: Paint<'_>);
    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, paint: Paint<'_>);
    /// Closed outline through `points`.
    fn polygon(&mut self, points: &[(f64, f64)], paint: Paint<'_>);
    /// Text centred on `x`, baseline at `y`.
    fn text(&mut self, x: f64, y: f64, text: &str, style: TextStyle<'_>);
    fn image(&mut self, href: &str, x: f64, y: f64, w: f64, h: f64);
    fn begin_group(&mut self, id: &str);
    fn end_group(&mut self);
}

/// Escape text for XML content and attribute values.
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Builds an SVG document in memory.
#[derive(Debug)]
pub struct SvgSurface {
    buf: String,
    depth: usize,
}

impl SvgSurface {
    pub fn new(width: u32, height: u32) -> Self {
        let mut buf = String::new();
        let _ = writeln!(
            buf,
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
        );
        Self { buf, depth: 1 }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.buf.push_str("  ");
        }
    }

    fn paint_attrs(paint: Paint<'_>) -> String {
        format!(
            r#"fill="{}" stroke="{}" stroke-width="{:.2}" opacity="{:.2}""#,
            escape_xml(paint.fill),
            escape_xml(paint.stroke),
            paint.stroke_width,
            paint.opacity
        )
    }

    /// Close any open groups and the root element.
    pub fn finish(mut self) -> String {
        while self.depth > 1 {
            self.end_group();
        }
        self.buf.push_str("</svg>\n");
        self.buf
    }
}

impl DrawingSurface for SvgSurface {
    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, paint: Paint<'_>) {
        self.indent();
        let attrs = Self::paint_attrs(paint);
        let _ = writeln!(
            self.buf,
            r#"<rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" {attrs}/>"#
        );
    }

    fn circle(&mut self, cx: f64, cy: f64, r: f64, paint: Paint<'_>) {
        self.indent();
        let attrs = Self::paint_attrs(paint);
        let _ = writeln!(
            self.buf,
            r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="{r:.2}" {attrs}/>"#
        );
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, paint: Paint<'_>) {
        self.indent();
        let attrs = Self::paint_attrs(paint);
        let _ = writeln!(
            self.buf,
            r#"<line x1="{x1:.2}" y1="{y1:.2}" x2="{x2:.2}" y2="{y2:.2}" {attrs}/>"#
        );
    }

    fn polygon(&mut self, points: &[(f64, f64)], paint: Paint<'_>) {
        if points.len() < 3 {
            return;
        }
        self.indent();
        let attrs = Self::paint_attrs(paint);
        let mut coords = String::with_capacity(points.len() * 14);
        for (i, (x, y)) in points.iter().enumerate() {
            if i > 0 {
                coords.push(' ');
            }
            let _ = write!(coords, "{x:.1},{y:.1}");
        }
        let _ = writeln!(self.buf, r#"<polygon points="{coords}" {attrs}/>"#);
    }

    fn text(&mut self, x: f64, y: f64, text: &str, style: TextStyle<'_>) {
        self.indent();
        let weight = if style.bold { "bold" } else { "normal" };
        let _ = writeln!(
            self.buf,
            r#"<text x="{x:.2}" y="{y:.2}" text-anchor="middle" font-family="{}" font-size="{:.1}" font-weight="{weight}" fill="{}">{}</text>"#,
            escape_xml(style.font_family),
            style.font_size,
            escape_xml(style.fill),
            escape_xml(text)
        );
    }

    fn image(&mut self, href: &str, x: f64, y: f64, w: f64, h: f64) {
        self.indent();
        let href = escape_xml(href);
        let _ = writeln!(
            self.buf,
            r#"<image href="{href}" xlink:href="{href}" x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" preserveAspectRatio="none"/>"#
        );
    }

    fn begin_group(&mut self, id: &str) {
        self.indent();
        let _ = writeln!(self.buf, r#"<g id="{}">"#, escape_xml(id));
        self.depth += 1;
    }

    fn end_group(&mut self) {
        if self.depth <= 1 {
            return;
        }
        self.depth -= 1;
        self.indent();
        self.buf.push_str("</g>\n");
    }
}
