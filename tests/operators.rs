use std::sync::Arc;

use float_eq::assert_float_eq;
use ndarray::{Array2, ArrayD, Axis, IxDyn, array, concatenate};
use ndarray_rand::{RandomExt, rand_distr::Uniform};
use proptest::prelude::*;
use rand::Rng;
use rand_core::SeedableRng;
use rand_isaac::Isaac64Rng;
use rstest::rstest;

use josephem::{
    FOV, LOR, LorBatch, Point, TofBins, TofKernel,
    operator::{
        Array, Composite, ElementwiseMultiplication, GaussianFilter, JosephProjector,
        LinearOperator, Matrix, OperatorError, SparseMatrix, SubsetOperator, Vstack, vdot,
    },
    subsets::{Partition, PartitionStrategy},
    system_matrix::SystemMatrixRow,
};

// ----- Helpers ---------------------------------------------------------------------

fn fov() -> FOV { FOV::centred([9, 8, 5], [2.0, 2.5, 3.0]).unwrap() }

/// LORs between random points on a cylinder enclosing `fov()`
fn ring(rng: &mut Isaac64Rng, n: usize) -> Arc<LorBatch> {
    let mut point = || {
        let phi = rng.gen::<f32>() * std::f32::consts::TAU;
        Point::new(25.0 * phi.cos(), 25.0 * phi.sin(), rng.gen_range(-9.0..9.0))
    };
    Arc::new(LorBatch::new((0..n).map(|_| LOR::new(point(), point())).collect()).unwrap())
}

fn random(rng: &mut Isaac64Rng, shape: &[usize]) -> Array {
    ArrayD::random_using(IxDyn(shape), Uniform::new(0.0, 1.0), rng)
}

fn max_abs_difference(a: &Array, b: &Array) -> f32 {
    assert_eq!(a.shape(), b.shape());
    a.iter().zip(b).map(|(a, b)| (a - b).abs()).fold(0.0, f32::max)
}

fn sinogram_tof() -> TofKernel { TofKernel::new(4.0, 3.0, 3.0, TofBins::Sinogram { num_bins: 9 }).unwrap() }

/// One representative of every kind of operator and combinator
fn operator(name: &str, rng: &mut Isaac64Rng) -> Box<dyn LinearOperator> {
    let shape = fov().shape();
    match name {
        "matrix" => Box::new(Matrix::new(Array2::random_using((7, 5), Uniform::new(-1.0, 1.0), rng))),
        "sparse" => {
            let rows = (0..20).map(|_| (0..6)
                .map(|_| (rng.gen_range(0..24), rng.gen_range(-1.0..1.0)))
                .collect::<SystemMatrixRow>())
                .collect();
            Box::new(SparseMatrix::new(&[2, 3, 4], rows).unwrap())
        }
        "elementwise" => Box::new(ElementwiseMultiplication::new(random(rng, &shape))),
        "gaussian"    => Box::new(GaussianFilter::new(&shape, &[1.2, 0.0, 0.7]).unwrap()),
        "joseph"      => Box::new(JosephProjector::new(fov(), ring(rng, 300)).unwrap().with_job_size(32)),
        "joseph-tof"  => Box::new(JosephProjector::with_tof(fov(), ring(rng, 100), sinogram_tof()).unwrap()),
        "joseph-listmode" => {
            let lors = ring(rng, 200);
            let bins = (0..lors.len()).map(|_| rng.gen_range(-4..=4)).collect();
            let lors = Arc::new((*lors).clone().with_tof_bins(bins).unwrap());
            let tof = TofKernel::new(4.0, 3.0, 3.0, TofBins::Listmode).unwrap();
            Box::new(JosephProjector::with_tof(fov(), lors, tof).unwrap())
        }
        "composite" => {
            let projector = JosephProjector::new(fov(), ring(rng, 150)).unwrap();
            let attenuation = random(rng, &[150]);
            Box::new(Composite::new(vec![
                Box::new(ElementwiseMultiplication::new(attenuation)),
                Box::new(projector),
                Box::new(GaussianFilter::new(&shape, &[1.0]).unwrap()),
            ]).unwrap())
        }
        "vstack" => Box::new(Vstack::new(vec![
            Box::new(JosephProjector::new(fov(), ring(rng, 50)).unwrap()),
            Box::new(JosephProjector::with_tof(fov(), ring(rng, 30), sinogram_tof()).unwrap()),
            Box::new(ElementwiseMultiplication::new(random(rng, &shape))),
        ]).unwrap()),
        "subsets" => Box::new(SubsetOperator::new(
            (0..4).map(|_| Box::new(JosephProjector::new(fov(), ring(rng, 40)).unwrap()) as Box<dyn LinearOperator>)
                .collect()
        ).unwrap()),
        _ => panic!("no operator called {name}"),
    }
}

// ----- Adjointness and linearity of everything ---------------------------------------

#[rstest(/**/ name,
         case("matrix"),
         case("sparse"),
         case("elementwise"),
         case("gaussian"),
         case("joseph"),
         case("joseph-tof"),
         case("joseph-listmode"),
         case("composite"),
         case("vstack"),
         case("subsets"),
)]
fn adjointness(name: &str) {
    let mut rng = Isaac64Rng::seed_from_u64(2024);
    let op = operator(name, &mut rng);
    for _ in 0..100 {
        op.adjointness_test(&mut rng, 1e-5).unwrap();
    }
}

#[rstest(/**/ name,
         case("matrix"),
         case("gaussian"),
         case("joseph"),
         case("joseph-tof"),
         case("composite"),
         case("vstack"),
)]
fn linearity(name: &str) {
    let mut rng = Isaac64Rng::seed_from_u64(7);
    let op = operator(name, &mut rng);
    let (a, b) = (1.7_f32, -0.4_f32);
    for _ in 0..10 {
        let x = random(&mut rng, op.input_shape());
        let z = random(&mut rng, op.input_shape());
        let combined = op.forward(&(&x * a + &z * b)).unwrap();
        let separate = op.forward(&x).unwrap() * a + op.forward(&z).unwrap() * b;
        let scale = separate.iter().fold(1.0_f32, |m, v| m.max(v.abs()));
        assert!(max_abs_difference(&combined, &separate) / scale < 1e-5);
    }
}

#[test]
fn shapes_are_checked_without_broadcasting() {
    let mut rng = Isaac64Rng::seed_from_u64(3);
    let op = operator("joseph", &mut rng);
    let wrong = Array::zeros(IxDyn(&[9, 8, 1]));
    assert!(matches!(op.forward(&wrong), Err(OperatorError::ShapeMismatch { .. })));
    let wrong = Array::zeros(IxDyn(&[301]));
    assert!(matches!(op.adjoint(&wrong), Err(OperatorError::ShapeMismatch { .. })));
}

// ----- Combinators -------------------------------------------------------------------

#[test]
fn composite_applies_the_last_operator_first() {
    // A: 1x2, B: 2x3. Only A ∘ B makes sense.
    let a = || Box::new(Matrix::new(array![[1.0_f32, -1.0]])) as Box<dyn LinearOperator>;
    let b = || Box::new(Matrix::new(array![[1.0_f32, 2.0, 3.0], [0.0, 1.0, 0.0]])) as Box<dyn LinearOperator>;
    let ab = Composite::new(vec![a(), b()]).unwrap();
    assert_eq!(ab.input_shape(), &[3]);
    assert_eq!(ab.output_shape(), &[1]);
    let x = array![1.0_f32, 1.0, 1.0].into_dyn();
    // b(x) = [6, 1]; a([6, 1]) = 5
    assert_eq!(ab.forward(&x).unwrap(), array![5.0_f32].into_dyn());
    // Adjoint: b^T(a^T([2])) = b^T([2, -2]) = [2, 2, 6]
    assert_eq!(ab.adjoint(&array![2.0_f32].into_dyn()).unwrap(), array![2.0_f32, 2.0, 6.0].into_dyn());
    assert!(matches!(Composite::new(vec![b(), a()]), Err(OperatorError::ChainMismatch { position: 1, .. })));
}

#[test]
fn vstack_concatenates_and_sums() {
    let mut rng = Isaac64Rng::seed_from_u64(4);
    let parts = [ring(&mut rng, 20), ring(&mut rng, 30), ring(&mut rng, 10)];
    let projector = |lors: &Arc<LorBatch>| JosephProjector::new(fov(), lors.clone()).unwrap();
    let stack = Vstack::new(parts.iter().map(|l| Box::new(projector(l)) as Box<dyn LinearOperator>).collect()).unwrap();
    assert_eq!(stack.output_shape(), &[60]);

    let x = random(&mut rng, &fov().shape());
    let pieces: Vec<Array> = parts.iter().map(|l| projector(l).forward(&x).unwrap()).collect();
    let views: Vec<_> = pieces.iter().map(|p| p.view()).collect();
    assert_eq!(stack.forward(&x).unwrap(), concatenate(Axis(0), &views).unwrap());

    let y = random(&mut rng, &[60]);
    let mut expected = Array::zeros(IxDyn(&fov().shape()));
    for (piece, lors) in stack.split(&y).unwrap().iter().zip(&parts) {
        expected = expected + projector(lors).adjoint(piece).unwrap();
    }
    assert!(max_abs_difference(&stack.adjoint(&y).unwrap(), &expected) < 1e-4);
}

#[rstest(/**/ strategy,
         case(PartitionStrategy::Interleaved),
         case(PartitionStrategy::Contiguous),
)]
fn subsets_agree_with_the_whole_projector(strategy: PartitionStrategy) {
    let mut rng = Isaac64Rng::seed_from_u64(5);
    let lors = ring(&mut rng, 101);
    let tof = sinogram_tof();
    let whole = JosephProjector::with_tof(fov(), lors.clone(), tof).unwrap();
    let partition = Partition::new(strategy, lors.len(), 4).unwrap();
    let subsets = SubsetOperator::new(partition.split_lors(&lors).unwrap().into_iter()
        .map(|lors| Box::new(JosephProjector::with_tof(fov(), Arc::new(lors), tof).unwrap()) as Box<dyn LinearOperator>)
        .collect()).unwrap();

    // Forward: each subset sees its own rows of the whole projection
    let x = random(&mut rng, &fov().shape());
    let projection = whole.forward(&x).unwrap();
    for (k, expected) in partition.split_data(&projection).unwrap().iter().enumerate() {
        assert!(max_abs_difference(&subsets.apply_subset(&x, k).unwrap(), expected) < 1e-5);
    }

    // Adjoint: sum of the subset back-projections
    let y = random(&mut rng, whole.output_shape());
    let mut total = Array::zeros(IxDyn(&fov().shape()));
    for (k, y_k) in partition.split_data(&y).unwrap().iter().enumerate() {
        total = total + subsets.adjoint_subset(y_k, k).unwrap();
    }
    assert!(max_abs_difference(&total, &whole.adjoint(&y).unwrap()) < 1e-3);
    assert!(matches!(subsets.apply_subset(&x, 4), Err(OperatorError::SubsetIndex { index: 4, count: 4 })));
}

// ----- Geometry edge cases -----------------------------------------------------------

#[test]
fn degenerate_and_outside_lors_contribute_nothing() {
    let p = Point::new(1.0, 1.0, 1.0);
    let lors = Arc::new(LorBatch::new(vec![
        LOR::new(p, p),
        LOR::new(Point::new(-50.0, 40.0, 0.0), Point::new(50.0, 40.0, 0.0)),
        LOR::new(Point::new(0.0, 0.0, 30.0), Point::new(0.0, 0.0, 40.0)),
    ]).unwrap());
    for op in [
        JosephProjector::new(fov(), lors.clone()).unwrap(),
        JosephProjector::with_tof(fov(), lors.clone(), sinogram_tof()).unwrap(),
    ] {
        let y = op.forward(&Array::ones(IxDyn(&fov().shape()))).unwrap();
        assert!(y.iter().all(|&v| v == 0.0));
        let image = op.adjoint(&Array::ones(IxDyn(op.output_shape()))).unwrap();
        assert!(image.iter().all(|&v| v == 0.0));
    }
}

// ----- The 3x2 matrix example ---------------------------------------------------------

#[test]
fn matrix_end_to_end() {
    let a = Matrix::new(array![[1.0_f32, 2.0], [-3.0, 2.0], [-1.0, -1.0]]);
    let y = a.forward(&array![-2.0_f32, 1.0].into_dyn()).unwrap();
    assert_eq!(y, array![0.0_f32, 8.0, 1.0].into_dyn());
    let x = a.adjoint(&array![1.0_f32, 1.0, 1.0].into_dyn()).unwrap();
    assert_eq!(x, array![-3.0_f32, 3.0].into_dyn());
}

// ----- Properties of the Joseph projector ---------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// An axis-aligned LOR through a uniform image sees the whole width of
    /// the FOV, wherever it crosses it.
    #[test]
    fn axis_aligned_lors_see_the_full_width(
        y in -9.0_f32..9.0,
        z in -5.0_f32..5.0,
    ) {
        let fov = FOV::centred([10, 10, 6], [2.0, 2.0, 2.0]).unwrap();
        let lors = Arc::new(LorBatch::new(vec![
            LOR::new(Point::new(-30.0, y, z), Point::new(30.0, y, z)),
        ]).unwrap());
        let op = JosephProjector::new(fov, lors).unwrap();
        let projection = op.forward(&Array::ones(IxDyn(&[10, 10, 6]))).unwrap();
        assert_float_eq!(projection[[0].as_slice()], 20.0, r2nd <= 1e-5);
    }

    /// Summed over all TOF bins, a sinogram projection is the non-TOF one
    /// (when the bins cover the whole LOR).
    #[test]
    fn tof_bins_add_up_to_the_non_tof_projection(seed in 0_u64..1000) {
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let lors = ring(&mut rng, 5);
        let tof = TofKernel::new(3.0, 2.0, 5.0, TofBins::Sinogram { num_bins: 41 }).unwrap();
        let x = random(&mut rng, &fov().shape());
        let plain = JosephProjector::new(fov(), lors.clone()).unwrap().forward(&x).unwrap();
        let binned = JosephProjector::with_tof(fov(), lors, tof).unwrap().forward(&x).unwrap();
        let summed = binned.sum_axis(Axis(1));
        for (s, p) in summed.iter().zip(&plain) {
            assert_float_eq!(*s, *p, abs <= 1e-2 * p.max(1.0));
        }
    }
}

#[test]
fn norm_of_a_projector_bounds_its_action() {
    let mut rng = Isaac64Rng::seed_from_u64(6);
    let op = operator("joseph", &mut rng);
    let norm = op.norm(&mut rng, 30).unwrap() as f64;
    for _ in 0..10 {
        let x = random(&mut rng, op.input_shape());
        let ax = op.forward(&x).unwrap();
        assert!(vdot(&ax, &ax).sqrt() <= norm * vdot(&x, &x).sqrt() * 1.01);
    }
}
