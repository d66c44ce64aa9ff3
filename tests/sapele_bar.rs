use undercut_fem::optimization::{BarParameters, Material};
use undercut_fem::{
    compute_frequencies_2d, compute_frequencies_3d, generate_element_heights, get_bending_frequencies_3d, Cut,
    SolidOptions,
};

const LENGTH_M: f64 = 0.551; // 551 mm
const WIDTH_M: f64 = 0.032; // 32 mm
const THICKNESS_M: f64 = 0.024; // 24 mm
const MIN_HEIGHT_M: f64 = 0.004;
const COLUMNS: usize = 40;
const MAX_REASONABLE_FREQ_HZ: f64 = 1.0e6;

fn sapele() -> Material {
    Material::sapele()
}

#[test]
fn sapele_bar_modal_frequencies_are_positive_and_sorted() {
    let heights = [THICKNESS_M; COLUMNS];
    let freqs = compute_frequencies_3d(&heights, LENGTH_M, WIDTH_M, &sapele(), 6, &SolidOptions::default()).unwrap();

    assert_eq!(freqs.len(), 6);
    for window in freqs.windows(2) {
        assert!(window[0] <= window[1]);
    }
    for f in freqs {
        assert!(f.is_finite());
        assert!(f > 0.0);
        assert!(f < MAX_REASONABLE_FREQ_HZ);
    }
}

#[test]
fn solid_and_beam_fundamentals_agree() {
    let bar = BarParameters::new(LENGTH_M, WIDTH_M, THICKNESS_M, MIN_HEIGHT_M);
    let beam = compute_frequencies_2d(&[], &bar, &sapele(), 120, 2).unwrap();

    let heights = [THICKNESS_M; COLUMNS];
    let solid =
        get_bending_frequencies_3d(&heights, LENGTH_M, WIDTH_M, &sapele(), 1, &SolidOptions::default()).unwrap();

    // full integration stiffens the solid model
    let ratio = solid[0] / beam[0];
    assert!(ratio > 0.95 && ratio < 1.8, "solid {} vs beam {}", solid[0], beam[0]);
}

#[test]
fn central_undercut_lowers_both_models() {
    let bar = BarParameters::new(LENGTH_M, WIDTH_M, THICKNESS_M, MIN_HEIGHT_M);
    let cuts = [Cut::new(0.12, 0.012)];

    let uncut_2d = compute_frequencies_2d(&[], &bar, &sapele(), 120, 1).unwrap();
    let cut_2d = compute_frequencies_2d(&cuts, &bar, &sapele(), 120, 1).unwrap();
    assert!(cut_2d[0] < uncut_2d[0]);

    let options = SolidOptions::default();
    let uncut_heights = [THICKNESS_M; COLUMNS];
    let cut_heights = generate_element_heights(&cuts, LENGTH_M, THICKNESS_M, COLUMNS);
    let uncut_3d = get_bending_frequencies_3d(&uncut_heights, LENGTH_M, WIDTH_M, &sapele(), 1, &options).unwrap();
    let cut_3d = get_bending_frequencies_3d(&cut_heights, LENGTH_M, WIDTH_M, &sapele(), 1, &options).unwrap();
    assert!(cut_3d[0] < uncut_3d[0]);
}
