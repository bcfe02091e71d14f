use shadow_rs::ShadowBuilder;

fn main() {
    // build metadata behind `cadence-rs --version`
    ShadowBuilder::builder()
        .build()
        .expect("Failed to generate build metadata");
}
