fn main() {
    jay_allocator::cli::main();
}
