fn main() {
    magnetometry_pipeline::cli::run();
}
