fn main() {
    git_shelf::commands::main()
}
