//! Pagination plan for the rendered document surface.
//!
//! The surface is scaled to the full page width. If it then fits on one
//! page it is drawn once, anchored to the top edge. Otherwise it is cut
//! into `N = ceil(scaled_height / page_height)` equal horizontal bands and
//! every band is stretched over a whole page, so a document only slightly
//! taller than one page is squashed onto two full pages rather than
//! leaving a near-empty second page.
//!
//! Coordinates are PDF points in the bottom-up page space.

use crate::config::PageSize;

/// A rectangle on the page, origin at the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Rows `[top, top + height)` of the source bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub top: u32,
    pub height: u32,
}

/// One output page: which source rows, drawn where.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePlan {
    pub band: Band,
    pub rect: PdfRect,
}

/// Plan the output pages for a `width × height` pixel surface.
///
/// Returns an empty plan for a degenerate (zero-sized) surface.
pub fn plan_pages(width: u32, height: u32, page: PageSize) -> Vec<PagePlan> {
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let scaled_height = page.width_pt * height as f32 / width as f32;

    if scaled_height <= page.height_pt {
        return vec![PagePlan {
            band: Band { top: 0, height },
            rect: PdfRect {
                x: 0.0,
                y: page.height_pt - scaled_height,
                width: page.width_pt,
                height: scaled_height,
            },
        }];
    }

    let n = page_count(scaled_height, page.height_pt).min(height);
    let full_page = PdfRect {
        x: 0.0,
        y: 0.0,
        width: page.width_pt,
        height: page.height_pt,
    };

    (0..n)
        .map(|i| {
            let top = band_edge(i, n, height);
            let bottom = band_edge(i + 1, n, height);
            PagePlan {
                band: Band {
                    top,
                    height: bottom - top,
                },
                rect: full_page,
            }
        })
        .collect()
}

fn page_count(scaled_height: f32, page_height: f32) -> u32 {
    // Float noise must not turn an exact multiple into an extra page.
    let ratio = (scaled_height / page_height) as f64;
    (ratio - 1e-6).ceil().max(1.0) as u32
}

/// `round(i * height / n)` in integer arithmetic.
fn band_edge(i: u32, n: u32, height: u32) -> u32 {
    ((i as u64 * height as u64 + n as u64 / 2) / n as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const A4: PageSize = PageSize::A4;

    /// Largest pixel height whose scaled height is at most `ratio` pages at width 2400.
    fn height_for_ratio(ratio: f32) -> u32 {
        (ratio * A4.height_pt / A4.width_pt * 2400.0).floor() as u32
    }

    #[test]
    fn short_surface_is_one_top_anchored_page() {
        let plan = plan_pages(2400, 1200, A4);
        assert_eq!(plan.len(), 1);
        let p = plan[0];
        assert_eq!(p.band, Band { top: 0, height: 1200 });
        assert!((p.rect.width - A4.width_pt).abs() < 1e-3);
        assert!((p.rect.height - 297.64).abs() < 0.01);
        assert!((p.rect.y + p.rect.height - A4.height_pt).abs() < 1e-3);
    }

    #[test]
    fn tall_surface_is_split_into_ceil_ratio_pages() {
        let h = height_for_ratio(2.3);
        let plan = plan_pages(2400, h, A4);
        assert_eq!(plan.len(), 3);

        let total: u32 = plan.iter().map(|p| p.band.height).sum();
        assert_eq!(total, h);
        assert_eq!(plan[0].band.top, 0);
        for pair in plan.windows(2) {
            assert_eq!(pair[0].band.top + pair[0].band.height, pair[1].band.top);
            assert!(pair[0].band.height.abs_diff(pair[1].band.height) <= 1);
        }
        for p in &plan {
            assert_eq!(
                p.rect,
                PdfRect {
                    x: 0.0,
                    y: 0.0,
                    width: A4.width_pt,
                    height: A4.height_pt
                }
            );
        }
    }

    #[test]
    fn slightly_taller_than_one_page_needs_two() {
        let plan = plan_pages(2400, height_for_ratio(1.05), A4);
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn exact_multiple_adds_no_extra_page() {
        let plan = plan_pages(2400, height_for_ratio(2.0), A4);
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn degenerate_surface_has_no_pages() {
        assert!(plan_pages(0, 100, A4).is_empty());
        assert!(plan_pages(100, 0, A4).is_empty());
    }
}
