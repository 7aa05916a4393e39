fn main() {
    tabletop_perception::cli::run();
}
