use archetypes::heatmap::{feature_heatmap, occupation_heatmap};
use archetypes::normalize::normalize_matrix;
use archetypes::ratings::{pivot_ratings, shave_soc_code, Rating, DEFAULT_SCALE, DEFAULT_SOC_DIGITS};
use archetypes::svd::SvdDecomposition;
use archetypes::{
    bootstrap_fit, Archetypes, BootstrapConfig, ForestConfig, GradientBoostingRegressor, NameLookup, NmfConfig,
    NormKind, RandomForestRegressor, TreeConfig,
};

use approx::assert_abs_diff_eq;
use ndarray::{Array1, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

const ELEMENTS: [&str; 6] = [
    "Active Listening",
    "Writing",
    "Mathematics",
    "Programming",
    "Repairing",
    "Equipment Maintenance",
];

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Three occupational families (management, computing, trades) with noisy
// skill levels, spread over "Level" and "Importance" scales.
fn synthetic_ratings(per_family: usize, seed: u64) -> (Vec<Rating>, HashMap<String, String>) {
    let profiles = [
        [5.0, 4.5, 2.0, 0.5, 0.5, 0.5],
        [3.0, 3.0, 4.5, 5.0, 0.5, 1.0],
        [1.5, 1.0, 2.0, 0.5, 5.0, 4.5],
    ];
    let families = ["11", "15", "47"];
    let titles = ["Manager", "Developer", "Mechanic"];
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut records = Vec::new();
    let mut names = HashMap::new();
    for (f, profile) in profiles.iter().enumerate() {
        for i in 0..per_family {
            let code = format!("{}-{:03}0.00", families[f], 100 + i);
            names.insert(shave_soc_code(&code, DEFAULT_SOC_DIGITS), format!("{} {}", titles[f], i));
            for (e, &level) in profile.iter().enumerate() {
                for scale in [DEFAULT_SCALE, "Importance"] {
                    records.push(Rating {
                        occupation_code: code.clone(),
                        element_name: ELEMENTS[e].to_string(),
                        scale_name: scale.to_string(),
                        value: (level + rng.gen_range(-0.3..0.3_f64)).max(0.0),
                    });
                }
            }
        }
    }
    (records, names)
}

#[test]
fn ratings_to_archetypes_to_heatmaps() {
    init_logging();
    let (records, names) = synthetic_ratings(8, 21);
    let skills = pivot_ratings(&records, DEFAULT_SCALE).unwrap();
    assert_eq!(skills.dim(), (24, 6));

    // Shave codes to census granularity before the lookup is applied.
    let shaved_ids: Vec<String> = skills.row_ids().iter().map(|c| shave_soc_code(c, DEFAULT_SOC_DIGITS)).collect();
    let skills = archetypes::FeatureMatrix::new(skills.values().clone(), shaved_ids, skills.column_names().to_vec())
        .unwrap();

    let arch = Archetypes::factorize(&skills, 3, &NmfConfig::default(), Some(&names as &dyn NameLookup)).unwrap();
    assert!(arch.report().reconstruction_err < arch.report().initial_err);
    assert!(arch.occupations().row_ids().iter().all(|id| names.values().any(|n| n == id)));

    // Members of a family load on the same dominant archetype.
    let dominant = |row: usize| {
        let r = arch.w_norm().values().row(row).to_owned();
        r.iter().enumerate().fold(0, |best, (k, &v)| if v > r[best] { k } else { best })
    };
    for family in 0..3 {
        let first = dominant(family * 8);
        assert!((family * 8..family * 8 + 8).all(|row| dominant(row) == first));
    }
    assert_ne!(dominant(0), dominant(8));
    assert_ne!(dominant(8), dominant(16));

    let features = feature_heatmap(&arch);
    assert_eq!(features.data.dim(), (3, 6));
    let mut sorted = features.col_order.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, (0..6).collect::<Vec<_>>());

    let occupations = occupation_heatmap(&arch);
    assert_eq!(occupations.data.dim(), (3, 24));
    assert_eq!(occupations.ordered().ncols(), 24);

    // Squared normalized loadings sum to one per occupation.
    let intensities = arch.occupations().squared();
    for row in intensities.values().rows() {
        assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
    }
}

#[test]
fn svd_view_of_the_same_matrix() {
    let (records, _) = synthetic_ratings(5, 2);
    let skills = pivot_ratings(&records, DEFAULT_SCALE).unwrap();
    let stat = normalize_matrix(&skills, NormKind::Stat, Axis(0));
    let svd = SvdDecomposition::compute(&stat).unwrap();
    let s = svd.singular_values();
    assert!(s.windows(2).into_iter().all(|w| w[0] >= w[1]));
    assert_eq!(svd.u().nrows(), 15);
    assert_eq!(svd.vt().column_names(), skills.column_names());
}

#[test]
fn archetype_weights_predict_a_wage_like_target() {
    init_logging();
    let (records, _) = synthetic_ratings(15, 5);
    let skills = pivot_ratings(&records, DEFAULT_SCALE).unwrap();
    // The target rises with the computing skills.
    let y: Array1<f64> = skills
        .values()
        .rows()
        .into_iter()
        .map(|r| 20.0 + 4.0 * r[2] + 6.0 * r[3])
        .collect();

    let forest = RandomForestRegressor::new(ForestConfig {
        n_trees: 20,
        tree: TreeConfig { max_depth: Some(6), ..Default::default() },
        ..Default::default()
    });
    let config = BootstrapConfig { iterations: 4, folds: 3, random_seed: Some(3), ..Default::default() };
    let session = bootstrap_fit(&skills, y.view(), &forest, &config).unwrap();

    assert_eq!(session.flat_scores().len(), 12);
    assert!(session.score().mean > 0.5);
    let importance = session.feature_importance().unwrap();
    assert_eq!(importance.len(), 6);
    let top_two: Vec<&str> = importance[..2].iter().map(|f| f.name.as_str()).collect();
    assert!(top_two.contains(&"Programming") || top_two.contains(&"Mathematics"));

    let boosting = GradientBoostingRegressor::default();
    let subsampled = BootstrapConfig { feature_subsample: Some(3), ..config };
    let session = bootstrap_fit(&skills, y.view(), &boosting, &subsampled).unwrap();
    assert_eq!(session.scores().dim(), (4, 3));
    let samples: usize = session.feature_importance().unwrap().iter().map(|f| f.samples).sum();
    assert_eq!(samples, 4 * 3 * 3);
}
