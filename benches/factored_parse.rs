use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chartwell::bilex::BilexParser;
use chartwell::factored::FastFactoredParser;
use chartwell::tree::{read_trees, Tree};
use chartwell::{Model, TrainOptions};

const TREEBANK: &str = r#"
(ROOT (S (NP (DT The) (NN dog)) (VP (VBD chased) (NP (DT the) (NN cat)))))
(ROOT (S (NP (DT The) (NN cat)) (VP (VBD slept))))
(ROOT (S (NP (DT A) (NN bird)) (VP (VBD saw) (NP (DT the) (NN dog)))))
(ROOT (S (NP (DT The) (NN bird)) (VP (VBD chased) (NP (DT a) (NN cat)))))
"#;

fn criterion_benchmark(c: &mut Criterion) {
  let trees: Vec<Tree> = read_trees(TREEBANK).unwrap();
  let model = Model::train(&trees, TrainOptions::default()).unwrap();
  let sentence = ["The", "dog", "chased", "the", "cat"];

  c.bench_function("bilex parse", |b| {
    b.iter(|| BilexParser::new(black_box(&model)).parse(black_box(&sentence)))
  });

  c.bench_function("factored parse k=3", |b| {
    b.iter(|| {
      let mut p = FastFactoredParser::new(black_box(&model), 3);
      p.parse(black_box(&sentence)).unwrap()
    })
  });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
