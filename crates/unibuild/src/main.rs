fn main() -> anyhow::Result<()> {
    unibuild::run()
}
