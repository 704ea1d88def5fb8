fn main() -> anyhow::Result<()> {
    synthbench::run()
}
