//! Top-level orchestration: smooth, build a graph, run GBS or HMSF, render a result image.
//!
//! Grounded on `examples/original_source/segmentation/segmentation.go` (the `Segmenter` struct
//! and its `smoothImage`/`buildGraph`/`GetResultImage` pipeline), `segmentation/gbs.go`,
//! `segmentation/hmsf.go`, and `segmentation/imageutils.go` (mean-colour / random-colour
//! rendering). Stage timing is logged with `log::debug!` in place of the Go version's
//! `fmt.Println(time.Since(start))`, per SPEC_FULL.md's ambient-stack section.

use std::time::Instant;

use rand::Rng;

use crate::blur;
use crate::error::SegmentError;
use crate::graph::{sort_edges_by_weight, Edge, Graph, GraphKind};
use crate::image::{validate_dimensions, Image, RgbaImage};
use crate::noise;
use crate::region_list::RegionList;
use crate::union_find::UnionFind;
use crate::weights::WeightFn;

/// Kernel radius factor `imaging.Blur` was always called with in the original pipeline.
const SMOOTH_KERNEL_RADIUS_FACTOR: f64 = 4.0;

/// Which segmentation algorithm produced the current result, so rendering and any future
/// diagnostics know which resultset shape they're reading.
#[derive(Debug)]
enum ResultSet {
    Gbs(UnionFind),
    Hmsf(UnionFind),
}

impl ResultSet {
    fn find(&mut self, v: u32) -> u32 {
        match self {
            ResultSet::Gbs(uf) => uf.find(v),
            ResultSet::Hmsf(uf) => uf.find(v),
        }
    }

    fn size(&mut self, v: u32) -> u32 {
        match self {
            ResultSet::Gbs(uf) => uf.size(v),
            ResultSet::Hmsf(uf) => uf.size(v),
        }
    }

    fn total_elements(&self) -> usize {
        match self {
            ResultSet::Gbs(uf) => uf.total_elements(),
            ResultSet::Hmsf(uf) => uf.total_elements(),
        }
    }
}

/// Runs the grid/king graph segmentation pipeline over a single image.
pub struct Segmenter {
    /// The image the segmenter was constructed with. Never mutated; `result_image` renders mean
    /// colours from these pixels, per SPEC_FULL.md §4.E.3's "original (unsmoothed) image".
    original: RgbaImage,
    graph_kind: GraphKind,
    weight_fn: WeightFn,
    random_colours: bool,
    result: Option<ResultSet>,
}

impl Segmenter {
    pub fn new(image: impl Image + 'static, graph_kind: GraphKind, weight_fn: WeightFn) -> Self {
        Segmenter {
            original: RgbaImage::from_image(&image),
            graph_kind,
            weight_fn,
            random_colours: false,
            result: None,
        }
    }

    pub fn set_random_colours(&mut self, value: bool) {
        self.random_colours = value;
    }

    /// Returns a smoothed copy of the original image for graph construction; leaves
    /// `self.original` untouched.
    fn smooth(&self, sigma: f64) -> RgbaImage {
        let start = Instant::now();
        let smoothed = blur::blur(&self.original, sigma, SMOOTH_KERNEL_RADIUS_FACTOR);
        log::debug!("smoothed image in {:?}", start.elapsed());
        smoothed
    }

    fn build_graph(&self, image: &RgbaImage) -> Graph {
        let start = Instant::now();
        let graph = Graph::from_image(image, self.weight_fn, self.graph_kind);
        log::debug!(
            "built {:?} graph ({} vertices, {} edges) in {:?}",
            self.graph_kind,
            graph.total_vertices(),
            graph.edges().len(),
            start.elapsed()
        );
        graph
    }

    /// Felzenszwalb-Huttenlocher graph-based segmentation.
    ///
    /// `sigma_smooth` is the pre-segmentation Gaussian smoothing strength, `k` sets the merge
    /// threshold `T(c) = k / |c|`, and `min_size` is the minimum region size enforced by a final
    /// small-region merge pass.
    pub fn segment_gbs(&mut self, sigma_smooth: f64, k: f64, min_size: usize) -> Result<(), SegmentError> {
        validate_dimensions(self.original.width, self.original.height)?;
        if sigma_smooth < 0.0 {
            return Err(SegmentError::NegativeSigma(sigma_smooth));
        }
        if k <= 0.0 {
            return Err(SegmentError::NonPositiveK(k));
        }
        if min_size == 0 {
            return Err(SegmentError::NonPositiveMinSize);
        }

        log::info!("segment_gbs: sigma_smooth={sigma_smooth} k={k} min_size={min_size}");
        let smoothed = self.smooth(sigma_smooth);
        let graph = self.build_graph(&smoothed);

        let start = Instant::now();
        let n = graph.total_vertices();
        let mut uf = UnionFind::new(n);
        let mut edges = graph.edges().to_vec();
        sort_edges_by_weight(&mut edges);

        let mut thresholds = vec![k; n];
        gbs_merge_from_threshold(&edges, &mut thresholds, k, &mut uf);
        gbs_merge_small_regions(&edges, min_size, &mut uf);

        log::info!("segment_gbs: {} components in {:?}", uf.components(), start.elapsed());
        self.result = Some(ResultSet::Gbs(uf));
        Ok(())
    }

    /// Heuristic for Minimum Spanning Forests segmentation.
    ///
    /// `sigma_smooth` is the pre-segmentation Gaussian smoothing strength; `min_weight` is the
    /// only free parameter, bounding both the initial edge-weight merge pass and (via each
    /// region's credit) the final border-credit merge pass.
    pub fn segment_hmsf(&mut self, sigma_smooth: f64, min_weight: f64) -> Result<(), SegmentError> {
        validate_dimensions(self.original.width, self.original.height)?;
        if sigma_smooth < 0.0 {
            return Err(SegmentError::NegativeSigma(sigma_smooth));
        }
        if min_weight <= 0.0 {
            return Err(SegmentError::NonPositiveMinWeight(min_weight));
        }

        log::info!("segment_hmsf: sigma_smooth={sigma_smooth} min_weight={min_weight}");
        let noise_start = Instant::now();
        let sigma = noise::estimate_stdev(&self.original);
        log::debug!("estimated noise stdev={sigma} in {:?}", noise_start.elapsed());

        let smoothed = self.smooth(sigma_smooth);
        let graph = self.build_graph(&smoothed);

        let start = Instant::now();
        let n = graph.total_vertices();
        let mut uf = UnionFind::new(n);
        let mut edges = graph.edges().to_vec();
        sort_edges_by_weight(&mut edges);

        let mut region_list = RegionList::new(n);
        hmsf_merge_edges_by_weight(&edges, min_weight, &mut uf, &mut region_list);

        let min_weights = hmsf_min_weights(&graph, &mut uf, &mut region_list);
        let mut region_credit = hmsf_compute_credit(&mut uf, &min_weights, sigma, n);
        hmsf_merge_regions_by_credit(&edges, &mut region_credit, &mut uf);

        log::info!("segment_hmsf: {} components in {:?}", uf.components(), start.elapsed());
        self.result = Some(ResultSet::Hmsf(uf));
        Ok(())
    }

    /// The rendered result of the last segmentation, or `None` if none has run yet.
    pub fn result_image(&mut self) -> Result<RgbaImage, SegmentError> {
        let width = self.original.width;
        let height = self.original.height;
        let random_colours = self.random_colours;
        let image = self.original.clone();

        let result = self.result.as_mut().ok_or(SegmentError::NoResult)?;
        let start = Instant::now();

        let n = width * height;
        let mut colours = vec![(0.0f64, 0.0f64, 0.0f64); n];
        if random_colours {
            let mut rng = rand::thread_rng();
            for slot in colours.iter_mut() {
                *slot = (
                    rng.gen_range(0..=255) as f64,
                    rng.gen_range(0..=255) as f64,
                    rng.gen_range(0..=255) as f64,
                );
            }
        } else {
            for y in 0..height {
                for x in 0..width {
                    let v = (x + y * width) as u32;
                    let root = result.find(v);
                    let size = result.size(root).max(1) as f64;
                    let (r, g, b) = image.at(x, y).to_rgb8();
                    let slot = &mut colours[root as usize];
                    slot.0 += r as f64 / size;
                    slot.1 += g as f64 / size;
                    slot.2 += b as f64 / size;
                }
            }
        }

        let mut out = RgbaImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let v = (x + y * width) as u32;
                let root = result.find(v);
                let (r, g, b) = colours[root as usize];
                out.set_rgb8(x, y, r.round() as u8, g.round() as u8, b.round() as u8);
            }
        }

        log::debug!(
            "rendered result image ({} components) in {:?}",
            result.total_elements(),
            start.elapsed()
        );
        Ok(out)
    }
}

/// `T(c) = k / |c|`, the GBS merge threshold for a region of the given size.
fn gbs_threshold(k: f64, size: u32) -> f64 {
    k / size as f64
}

fn gbs_merge_from_threshold(edges: &[Edge], thresholds: &mut [f64], k: f64, uf: &mut UnionFind) {
    for edge in edges {
        let u = uf.find(edge.u);
        let v = uf.find(edge.v);
        let u_ok = edge.weight <= thresholds[u as usize];
        let v_ok = edge.weight <= thresholds[v as usize];
        if !uf.connected(u, v) && u_ok && v_ok {
            let root = uf.union(u, v);
            let new_threshold = edge.weight + gbs_threshold(k, uf.size(root));
            thresholds[root as usize] = new_threshold;
        }
    }
}

fn gbs_merge_small_regions(edges: &[Edge], min_size: usize, uf: &mut UnionFind) {
    for edge in edges {
        let u = uf.find(edge.u);
        let v = uf.find(edge.v);
        let too_small = (uf.size(u) as usize) < min_size || (uf.size(v) as usize) < min_size;
        if u != v && too_small {
            uf.union(u, v);
        }
    }
}

fn hmsf_merge_edges_by_weight(
    edges: &[Edge],
    min_weight: f64,
    uf: &mut UnionFind,
    region_list: &mut RegionList,
) {
    for edge in edges {
        let u = uf.find(edge.u);
        let v = uf.find(edge.v);
        if u != v && edge.weight < min_weight {
            let root = uf.union(u, v);
            if root == u {
                region_list.union(root, v);
            } else {
                region_list.union(root, u);
            }
        }
    }
}

/// Minimum edge weight crossing each region's border, keyed by that region's (current) root.
fn hmsf_min_weights(graph: &Graph, uf: &mut UnionFind, region_list: &mut RegionList) -> Vec<f64> {
    let n = uf.total_elements();
    let mut min_weights = vec![0.0f64; n];
    let mut computed = vec![false; n];
    for v in 0..n as u32 {
        let region = uf.find(v);
        if computed[region as usize] {
            continue;
        }
        let mut min_w = f64::INFINITY;
        let members: Vec<u32> = region_list.elements(region).collect();
        for w in members {
            for (neighbour, weight) in graph.neighbors(w) {
                if uf.find(neighbour) != region && weight < min_w {
                    min_w = weight;
                }
            }
        }
        min_weights[region as usize] = min_w;
        computed[region as usize] = true;
    }
    min_weights
}

/// `Credit(R) = (minBorderWeight(R) - 2 * sigma) * sqrt(4 * pi * |R|)`.
fn hmsf_compute_credit(uf: &mut UnionFind, min_weights: &[f64], sigma: f64, n: usize) -> Vec<f64> {
    let mut credit = vec![0.0f64; n];
    for i in 0..n as u32 {
        let root = uf.find(i);
        let contrast = min_weights[root as usize] - 2.0 * sigma;
        credit[i as usize] = contrast * (4.0 * std::f64::consts::PI * uf.size(i) as f64).sqrt();
    }
    credit
}

fn hmsf_merge_regions_by_credit(edges: &[Edge], region_credit: &mut [f64], uf: &mut UnionFind) {
    for edge in edges {
        let u = uf.find(edge.u);
        let v = uf.find(edge.v);
        if u != v {
            let credit = region_credit[u as usize].min(region_credit[v as usize]);
            if credit > edge.weight {
                uf.union(u, v);
                let survivor = uf.find(u);
                region_credit[survivor as usize] = credit - edge.weight;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::RgbaImage;
    use crate::weights::nn_weight;

    fn checkerboard(width: usize, height: usize) -> RgbaImage {
        let mut img = RgbaImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                if (x / 4 + y / 4) % 2 == 0 {
                    img.set_rgb8(x, y, 20, 20, 20);
                } else {
                    img.set_rgb8(x, y, 220, 220, 220);
                }
            }
        }
        img
    }

    #[test]
    fn gbs_segments_a_checkerboard_into_multiple_regions() {
        let img = checkerboard(16, 16);
        let mut seg = Segmenter::new(img, GraphKind::Grid, nn_weight);
        seg.segment_gbs(0.0, 50.0, 4).unwrap();
        let result = seg.result_image().unwrap();
        assert_eq!(result.width, 16);
        assert_eq!(result.height, 16);
    }

    #[test]
    fn hmsf_segments_a_checkerboard() {
        let img = checkerboard(20, 12);
        let mut seg = Segmenter::new(img, GraphKind::King, nn_weight);
        seg.segment_hmsf(0.0, 60.0).unwrap();
        let result = seg.result_image().unwrap();
        assert_eq!(result.width, 20);
        assert_eq!(result.height, 12);
    }

    #[test]
    fn round_trip_rendering_on_constant_image() {
        // SPEC_FULL.md §8 scenario 3: a constant-colour image segments into exactly one region,
        // and its mean-colour rendering equals the input exactly.
        let mut img = RgbaImage::new(10, 10);
        for y in 0..10 {
            for x in 0..10 {
                img.set_rgb8(x, y, 77, 140, 201);
            }
        }
        let original = img.clone();
        let mut seg = Segmenter::new(img, GraphKind::Grid, nn_weight);
        seg.segment_gbs(0.0, 300.0, 1).unwrap();
        let result = seg.result_image().unwrap();
        assert_eq!(result, original);
    }

    #[test]
    fn mean_colour_rendering_uses_the_unsmoothed_original_pixels() {
        // A single row with an isolated bright pixel: a heavy `sigma_smooth` blur redistributes
        // it across its clamped neighbours, so the mean of the blurred row differs from the mean
        // of the original row. `k` is large enough that every edge merges into one region, so the
        // rendered colour must equal the exact mean of the five original pixels: 51.
        let mut img = RgbaImage::new(5, 1);
        for x in 0..4 {
            img.set_rgb8(x, 0, 0, 0, 0);
        }
        img.set_rgb8(4, 0, 255, 255, 255);

        let mut seg = Segmenter::new(img, GraphKind::Grid, nn_weight);
        seg.segment_gbs(3.0, 1.0e6, 5).unwrap();
        let result = seg.result_image().unwrap();
        for x in 0..5 {
            assert_eq!(result.at(x, 0).to_rgb8(), (51, 51, 51));
        }
    }

    #[test]
    fn gbs_splits_a_two_colour_image_along_the_boundary() {
        // SPEC_FULL.md §8 scenario 4.
        let mut img = RgbaImage::new(8, 4);
        for y in 0..4 {
            for x in 0..8 {
                if x < 4 {
                    img.set_rgb8(x, y, 0, 0, 0);
                } else {
                    img.set_rgb8(x, y, 255, 255, 255);
                }
            }
        }
        let mut seg = Segmenter::new(img, GraphKind::Grid, nn_weight);
        seg.segment_gbs(0.0, 100.0, 1).unwrap();
        let result = seg.result_image().unwrap();

        let left = result.at(0, 0).to_rgb8();
        let right = result.at(7, 0).to_rgb8();
        assert_ne!(left, right);
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(result.at(x, y).to_rgb8(), left, "pixel ({x},{y}) should match the left region");
            }
            for x in 4..8 {
                assert_eq!(result.at(x, y).to_rgb8(), right, "pixel ({x},{y}) should match the right region");
            }
        }
    }

    #[test]
    fn hmsf_with_larger_min_weight_never_yields_more_components() {
        // SPEC_FULL.md §8 invariant 8 (monotonicity).
        let img = checkerboard(16, 8);

        let mut low = Segmenter::new(img.clone(), GraphKind::Grid, nn_weight);
        low.segment_hmsf(0.0, 20.0).unwrap();

        let mut high = Segmenter::new(img, GraphKind::Grid, nn_weight);
        high.segment_hmsf(0.0, 200.0).unwrap();

        let count_components = |seg: &mut Segmenter, n: u32| {
            let roots: std::collections::HashSet<u32> =
                (0..n).map(|v| seg.result.as_mut().unwrap().find(v)).collect();
            roots.len()
        };
        let n = 16 * 8;
        let low_count = count_components(&mut low, n);
        let high_count = count_components(&mut high, n);
        assert!(high_count <= low_count);
    }

    #[test]
    fn result_image_none_before_segmentation() {
        let img = RgbaImage::new(4, 4);
        let mut seg = Segmenter::new(img, GraphKind::Grid, nn_weight);
        assert!(matches!(seg.result_image(), Err(SegmentError::NoResult)));
    }

    #[test]
    fn uniform_image_collapses_to_a_single_region() {
        let mut img = RgbaImage::new(10, 10);
        for y in 0..10 {
            for x in 0..10 {
                img.set_rgb8(x, y, 128, 128, 128);
            }
        }
        let mut seg = Segmenter::new(img, GraphKind::Grid, nn_weight);
        seg.segment_gbs(0.0, 10.0, 1).unwrap();
        let result = seg.result_image().unwrap();
        let first = result.at(0, 0).to_rgb8();
        for y in 0..10 {
            for x in 0..10 {
                assert_eq!(result.at(x, y).to_rgb8(), first);
            }
        }
    }

    #[test]
    fn rejects_non_positive_parameters() {
        let img = RgbaImage::new(4, 4);
        let mut seg = Segmenter::new(img.clone(), GraphKind::Grid, nn_weight);
        assert!(matches!(seg.segment_gbs(-1.0, 1.0, 1), Err(SegmentError::NegativeSigma(_))));
        assert!(matches!(seg.segment_gbs(0.0, 0.0, 1), Err(SegmentError::NonPositiveK(_))));
        assert!(matches!(seg.segment_gbs(0.0, 1.0, 0), Err(SegmentError::NonPositiveMinSize)));

        let mut seg2 = Segmenter::new(img, GraphKind::Grid, nn_weight);
        assert!(matches!(
            seg2.segment_hmsf(0.0, 0.0),
            Err(SegmentError::NonPositiveMinWeight(_))
        ));
    }
}
