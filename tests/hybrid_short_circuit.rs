use std::cell::{Cell, RefCell};
use targetmatch::{Candidate, HybridStrategy, Image, LocateResult, Strategy};

/// Returns fixed candidates and records every call.
struct Scripted {
    found: Vec<Candidate>,
    calls: Cell<usize>,
    regions: RefCell<Vec<(usize, usize)>>,
    thresholds: RefCell<Vec<f64>>,
}

impl Scripted {
    fn new(found: Vec<Candidate>) -> Self {
        Self {
            found,
            calls: Cell::new(0),
            regions: RefCell::new(Vec::new()),
            thresholds: RefCell::new(Vec::new()),
        }
    }
}

impl Strategy for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn locate(
        &self,
        _needle: &Image,
        haystack: &Image,
        similarity: f64,
    ) -> LocateResult<Vec<Candidate>> {
        self.calls.set(self.calls.get() + 1);
        self.regions
            .borrow_mut()
            .push((haystack.width(), haystack.height()));
        self.thresholds.borrow_mut().push(similarity);
        Ok(self.found.clone())
    }
}

fn window(x: usize, y: usize, confidence: f64) -> Candidate {
    Candidate {
        x,
        y,
        width: 10,
        height: 8,
        confidence,
    }
}

fn images() -> (Image, Image) {
    let needle = Image::from_gray(&[50; 80], 10, 8).unwrap();
    let haystack = Image::from_gray(&[50; 100 * 60], 100, 60).unwrap();
    (needle, haystack)
}

#[test]
fn empty_coarse_pass_skips_refinement() {
    let (needle, haystack) = images();
    let coarse = Scripted::new(Vec::new());
    let fine = Scripted::new(vec![window(0, 0, 1.0)]);
    let hybrid = HybridStrategy::new(&coarse, &fine, 0.6);

    let found = hybrid.locate(&needle, &haystack, 0.9).unwrap();
    assert!(found.is_empty());
    assert_eq!(coarse.calls.get(), 1);
    assert_eq!(fine.calls.get(), 0);
    assert_eq!(coarse.thresholds.borrow().as_slice(), [0.6]);
}

#[test]
fn every_coarse_window_is_confirmed_in_its_region() {
    let (needle, haystack) = images();
    let coarse = Scripted::new(vec![window(20, 10, 0.7), window(90, 50, 0.65)]);
    let fine = Scripted::new(vec![window(5, 4, 0.93)]);
    let hybrid = HybridStrategy::new(&coarse, &fine, 0.6);

    let found = hybrid.locate(&needle, &haystack, 0.9).unwrap();
    assert_eq!(fine.calls.get(), 2);
    assert_eq!(fine.thresholds.borrow().as_slice(), [0.0, 0.0]);
    assert_eq!(fine.regions.borrow().as_slice(), [(20, 16), (15, 14)]);

    assert_eq!(found.len(), 2);
    assert_eq!((found[0].x, found[0].y), (20, 10));
    assert_eq!((found[1].x, found[1].y), (90, 50));
    assert!(found.iter().all(|c| c.confidence == 0.93));
}

#[test]
fn unconfirmed_windows_are_dropped() {
    let (needle, haystack) = images();
    let coarse = Scripted::new(vec![window(20, 10, 0.7)]);
    let weak = Scripted::new(vec![window(5, 4, 0.5)]);
    let hybrid = HybridStrategy::new(&coarse, &weak, 0.6);
    assert!(hybrid.locate(&needle, &haystack, 0.9).unwrap().is_empty());

    let silent = Scripted::new(Vec::new());
    let hybrid = HybridStrategy::new(&coarse, &silent, 0.6);
    assert!(hybrid.locate(&needle, &haystack, 0.9).unwrap().is_empty());
}

#[test]
fn feature_poor_needles_fall_back_to_template_windows() {
    let (needle, haystack) = images();
    let coarse = Scripted::new(vec![window(20, 10, 0.95), window(60, 30, 0.8)]);
    let silent = Scripted::new(Vec::new());
    let hybrid = HybridStrategy::new(&coarse, &silent, 0.6);

    let found = hybrid.locate(&needle, &haystack, 0.9).unwrap();
    assert_eq!(silent.calls.get(), 2);
    assert_eq!(found.len(), 1);
    assert_eq!((found[0].x, found[0].y), (20, 10));
    assert_eq!(found[0].confidence, 0.95);
}

/// Confirms the needle only in regions of one width.
struct WidthGate {
    width: usize,
}

impl Strategy for WidthGate {
    fn name(&self) -> &'static str {
        "width-gate"
    }

    fn locate(
        &self,
        _needle: &Image,
        haystack: &Image,
        _similarity: f64,
    ) -> LocateResult<Vec<Candidate>> {
        if haystack.width() == self.width {
            Ok(vec![window(5, 4, 0.95)])
        } else {
            Ok(Vec::new())
        }
    }
}

#[test]
fn one_feature_poor_region_discards_feature_confirmations() {
    let (needle, haystack) = images();
    let coarse = Scripted::new(vec![window(20, 10, 0.92), window(90, 50, 0.7)]);
    let hybrid = HybridStrategy::new(&coarse, WidthGate { width: 20 }, 0.6);

    let found = hybrid.locate(&needle, &haystack, 0.9).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!((found[0].x, found[0].y), (20, 10));
    assert_eq!(found[0].confidence, 0.92);
}
