fn main() -> anyhow::Result<()> {
    posture_ai_lib::run()
}
