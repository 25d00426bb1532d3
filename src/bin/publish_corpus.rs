use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    corpus_pairs::app::run_publish_corpus(std::env::args().skip(1))
}
