//! 拓扑导出：Mermaid 文本 + PNG 位图
//!
//! 两种输出互相独立：位图渲染失败不影响文本。PNG 用 image 自绘（方框、连线、5x7 点阵字）。

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};
use thiserror::Error;

use crate::graph::topology::{NodeKind, Topology};

pub const DIAGRAM_FILE: &str = "orchestrator_graph.mmd";
pub const RASTER_FILE: &str = "orchestrator_graph.png";

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Raster rendering failed: {0}")]
    Raster(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 导出结果：文本总能生成，位图可能失败
#[derive(Debug)]
pub struct GraphExport {
    pub diagram_text: String,
    pub raster: Result<Vec<u8>, GraphError>,
}

/// 写文件结果：两个产物各自成功或失败
#[derive(Debug)]
pub struct ArtifactReport {
    pub diagram: Result<PathBuf, GraphError>,
    pub raster: Result<PathBuf, GraphError>,
}

pub fn export(topology: &Topology) -> GraphExport {
    GraphExport {
        diagram_text: to_mermaid(topology),
        raster: render_png(topology),
    }
}

/// Mermaid flowchart
pub fn to_mermaid(topology: &Topology) -> String {
    let mut out = String::from("flowchart TD\n");
    for node in &topology.nodes {
        let label = node.label.replace('"', "'");
        let shape = match node.kind {
            NodeKind::Terminal => format!("([\"{label}\"])"),
            NodeKind::Decision => format!("{{\"{label}\"}}"),
            NodeKind::Stage => format!("[\"{label}\"]"),
            NodeKind::Tool => format!("[[\"{label}\"]]"),
        };
        out.push_str(&format!("    {}{}\n", node.id, shape));
    }
    for edge in &topology.edges {
        match &edge.label {
            Some(label) => out.push_str(&format!("    {} -->|{}| {}\n", edge.from, label, edge.to)),
            None => out.push_str(&format!("    {} --> {}\n", edge.from, edge.to)),
        }
    }
    out
}

/// 在 dir 下写入 orchestrator_graph.mmd 与 orchestrator_graph.png
pub fn write_artifacts(topology: &Topology, dir: impl AsRef<Path>) -> ArtifactReport {
    let dir = dir.as_ref();
    if let Err(e) = std::fs::create_dir_all(dir) {
        let msg = e.to_string();
        return ArtifactReport {
            diagram: Err(GraphError::Io(e)),
            raster: Err(GraphError::Io(std::io::Error::other(msg))),
        };
    }
    let export = export(topology);

    let diagram_path = dir.join(DIAGRAM_FILE);
    let diagram = std::fs::write(&diagram_path, &export.diagram_text)
        .map(|_| diagram_path)
        .map_err(GraphError::from);

    let raster_path = dir.join(RASTER_FILE);
    let raster = export.raster.and_then(|bytes| {
        std::fs::write(&raster_path, bytes)
            .map(|_| raster_path)
            .map_err(GraphError::from)
    });

    match &raster {
        Ok(path) => tracing::info!(path = %path.display(), "graph raster written"),
        Err(e) => tracing::warn!(error = %e, "graph raster not written"),
    }
    ArtifactReport { diagram, raster }
}

const BOX_W: u32 = 150;
const BOX_H: u32 = 36;
const H_GAP: u32 = 24;
const V_GAP: u32 = 48;
const MARGIN: u32 = 40;
const MAX_SIDE: u32 = 8192;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([40, 40, 40]);
const LINE: Rgb<u8> = Rgb([120, 120, 120]);

fn fill_for(kind: NodeKind) -> Rgb<u8> {
    match kind {
        NodeKind::Terminal => Rgb([220, 220, 220]),
        NodeKind::Stage => Rgb([205, 225, 250]),
        NodeKind::Decision => Rgb([250, 235, 190]),
        NodeKind::Tool => Rgb([210, 240, 210]),
    }
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: u32,
    y: u32,
}

impl Rect {
    fn center_x(&self) -> i64 {
        (self.x + BOX_W / 2) as i64
    }
    fn top(&self) -> i64 {
        self.y as i64
    }
    fn bottom(&self) -> i64 {
        (self.y + BOX_H) as i64
    }
    fn right(&self) -> i64 {
        (self.x + BOX_W) as i64
    }
    fn mid_y(&self) -> i64 {
        (self.y + BOX_H / 2) as i64
    }
}

/// 按 rank 分层布局，每层水平居中
fn layout(topology: &Topology) -> (u32, u32, Vec<Rect>) {
    let max_rank = topology.nodes.iter().map(|n| n.rank).max().unwrap_or(0);
    let mut per_rank = vec![0u32; max_rank + 1];
    for node in &topology.nodes {
        per_rank[node.rank] += 1;
    }
    let widest = per_rank.iter().copied().max().unwrap_or(1).max(1);
    let content_w = widest * BOX_W + (widest - 1) * H_GAP;
    // 右侧留出回边的走线通道
    let width = content_w + 2 * MARGIN + MARGIN;
    let height = (max_rank as u32 + 1) * (BOX_H + V_GAP) - V_GAP + 2 * MARGIN;

    let mut placed = vec![0u32; max_rank + 1];
    let rects = topology
        .nodes
        .iter()
        .map(|node| {
            let count = per_rank[node.rank];
            let row_w = count * BOX_W + (count - 1) * H_GAP;
            let offset = MARGIN + (content_w - row_w) / 2;
            let i = placed[node.rank];
            placed[node.rank] += 1;
            Rect {
                x: offset + i * (BOX_W + H_GAP),
                y: MARGIN + node.rank as u32 * (BOX_H + V_GAP),
            }
        })
        .collect();
    (width, height, rects)
}

/// 渲染为 PNG 字节
pub fn render_png(topology: &Topology) -> Result<Vec<u8>, GraphError> {
    if topology.nodes.is_empty() {
        return Err(GraphError::Raster("topology has no nodes".to_string()));
    }
    let (width, height, rects) = layout(topology);
    if width > MAX_SIDE || height > MAX_SIDE {
        return Err(GraphError::Raster(format!("canvas {width}x{height} is too large")));
    }
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);
    let index_of = |id: &str| topology.nodes.iter().position(|n| n.id == id);
    let lane_x = (width - MARGIN / 2) as i64;

    for edge in &topology.edges {
        let (Some(from), Some(to)) = (index_of(&edge.from), index_of(&edge.to)) else {
            return Err(GraphError::Raster(format!(
                "edge {} -> {} references an unknown node",
                edge.from, edge.to
            )));
        };
        let (a, b) = (rects[from], rects[to]);
        if topology.nodes[to].rank > topology.nodes[from].rank {
            draw_line(&mut img, a.center_x(), a.bottom(), b.center_x(), b.top(), LINE);
            draw_marker(&mut img, b.center_x(), b.top());
        } else {
            // 回边：经右侧通道绕行
            draw_line(&mut img, a.right(), a.mid_y(), lane_x, a.mid_y(), LINE);
            draw_line(&mut img, lane_x, a.mid_y(), lane_x, b.mid_y(), LINE);
            draw_line(&mut img, lane_x, b.mid_y(), b.right(), b.mid_y(), LINE);
            draw_marker(&mut img, b.right(), b.mid_y());
        }
    }

    for (node, rect) in topology.nodes.iter().zip(&rects) {
        draw_box(&mut img, *rect, fill_for(node.kind));
        let label = node.label.to_uppercase();
        let text_w = label.chars().count() as u32 * GLYPH_ADVANCE;
        let tx = rect.x + BOX_W.saturating_sub(text_w) / 2;
        let ty = rect.y + (BOX_H - GLYPH_H) / 2;
        draw_text(&mut img, tx, ty, &label);
    }

    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| GraphError::Raster(e.to_string()))?;
    Ok(bytes)
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Bresenham 直线
fn draw_line(img: &mut RgbImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
    let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
    let (sx, sy) = (if x0 < x1 { 1 } else { -1 }, if y0 < y1 { 1 } else { -1 });
    let (mut x, mut y, mut err) = (x0, y0, dx + dy);
    loop {
        put(img, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// 箭头端点的小方块
fn draw_marker(img: &mut RgbImage, x: i64, y: i64) {
    for dx in -2..=2 {
        for dy in -2..=2 {
            put(img, x + dx, y + dy, INK);
        }
    }
}

fn draw_box(img: &mut RgbImage, rect: Rect, fill: Rgb<u8>) {
    for y in rect.y..rect.y + BOX_H {
        for x in rect.x..rect.x + BOX_W {
            let border = x == rect.x || x == rect.x + BOX_W - 1 || y == rect.y || y == rect.y + BOX_H - 1;
            put(img, x as i64, y as i64, if border { INK } else { fill });
        }
    }
}

const GLYPH_H: u32 = 7;
const GLYPH_ADVANCE: u32 = 6;

/// 5x7 点阵，每行低 5 位有效
fn glyph(c: char) -> [u8; 7] {
    match c {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '+' => [0x00, 0x04, 0x04, 0x1F, 0x04, 0x04, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '/' => [0x01, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10],
        '&' => [0x0C, 0x12, 0x14, 0x08, 0x15, 0x12, 0x0D],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        _ => [0; 7],
    }
}

fn draw_text(img: &mut RgbImage, x: u32, y: u32, text: &str) {
    for (i, c) in text.chars().enumerate() {
        let gx = x + i as u32 * GLYPH_ADVANCE;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..5u32 {
                if bits & (0x10 >> col) != 0 {
                    put(img, (gx + col) as i64, (y + row as u32) as i64, INK);
                }
            }
        }
    }
}
