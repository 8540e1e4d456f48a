fn main() -> anyhow::Result<()> {
    replenishment_desk_lib::run()
}
