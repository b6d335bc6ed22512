use std::env;
use std::fs;
use std::io;
use std::io::Write;
use std::process;

use chartwell::bilex::BilexParser;
use chartwell::factored::FastFactoredParser;
use chartwell::tree::read_trees;
use chartwell::{Model, TrainOptions};

type Err = Box<dyn std::error::Error + 'static>;

fn usage(prog_name: &str) -> String {
  format!(
    r"Usage: {} TREEBANK [options]

Trains on the bracketed trees in TREEBANK, then parses one sentence of
whitespace-separated tokens per stdin line.

Options:
  -h, --help      Print this message
  -k, --kbest N   Print the N best rescored parses (defaults to 1)
  -l, --lex       Use the exhaustive lexicalized parser (best parse only)",
    prog_name
  )
}

struct Args {
  filename: String,
  kbest: usize,
  lexicalized: bool,
}

impl Args {
  fn make_error_message(msg: &str, prog_name: impl AsRef<str>) -> String {
    format!("argument error: {}.\n\n{}", msg, usage(prog_name.as_ref()))
  }

  fn parse(v: Vec<String>) -> Result<Self, String> {
    if v.is_empty() {
      return Err(Self::make_error_message("bad argument vector", "chartwell"));
    }

    let args_len = v.len();
    let mut iter = v.into_iter();
    let prog_name = iter.next().unwrap();

    if args_len < 2 {
      return Err(Self::make_error_message("not enough arguments", prog_name));
    }

    let mut filename: Option<String> = None;
    let mut kbest = 1;
    let mut lexicalized = false;

    while let Some(o) = iter.next() {
      if o == "-h" || o == "--help" {
        println!("{}", usage(&prog_name));
        process::exit(0);
      } else if o == "-l" || o == "--lex" {
        lexicalized = true;
      } else if o == "-k" || o == "--kbest" {
        let n = iter
          .next()
          .ok_or_else(|| Self::make_error_message("-k needs a number", &prog_name))?;
        kbest = n
          .parse()
          .map_err(|_| Self::make_error_message("-k needs a number", &prog_name))?;
      } else if filename.is_none() {
        filename = Some(o);
      } else {
        return Err(Self::make_error_message("invalid arguments", prog_name));
      }
    }

    if let Some(filename) = filename {
      Ok(Self { filename, kbest, lexicalized })
    } else {
      Err(Self::make_error_message("missing treebank filename", prog_name))
    }
  }
}

fn parse_line(model: &Model, opts: &Args, line: &str) -> Result<(), Err> {
  let sentence = line.split_whitespace().collect::<Vec<_>>();
  if sentence.is_empty() {
    return Ok(());
  }

  if opts.lexicalized {
    match BilexParser::new(model).parse(&sentence) {
      Some(best) => println!("{:.4}\t{}", best.score, best.tree),
      None => println!("No parse"),
    }
    return Ok(());
  }

  let mut parser = FastFactoredParser::new(model, opts.kbest);
  if !parser.parse(&sentence)? {
    println!("No parse");
    return Ok(());
  }
  for st in parser.k_good_parses(opts.kbest.min(parser.num_retained()))? {
    println!("{:.4}\t{}", st.score, st.tree);
  }
  Ok(())
}

fn main() -> Result<(), Err> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let opts = match Args::parse(env::args().collect()) {
    Ok(opts) => opts,
    Err(msg) => {
      eprintln!("{}", msg);
      process::exit(255);
    }
  };

  let trees = read_trees(&fs::read_to_string(&opts.filename)?)?;
  let model = Model::train(&trees, TrainOptions::default())?;
  println!(
    "Trained on {} trees ({} words, {} states)",
    trees.len(),
    model.words.len(),
    model.states.len()
  );

  let mut input = String::new();
  loop {
    print!("> ");
    io::stdout().flush()?;

    match io::stdin().read_line(&mut input) {
      Ok(_) => {
        if input.is_empty() {
          // ctrl+d
          return Ok(());
        }
        parse_line(&model, &opts, input.trim())?;
        input.clear();
      }
      Err(error) => return Err(error.into()),
    }
  }
}
