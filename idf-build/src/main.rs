fn main() -> anyhow::Result<()> {
    idf_build::run()
}
