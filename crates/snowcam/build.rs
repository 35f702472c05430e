use vergen_gitcl::{BuildBuilder, CargoBuilder, Emitter, GitclBuilder};

const UNKNOWN: &str = "unknown";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = BuildBuilder::default().build_date(true).build()?;
    let cargo = CargoBuilder::default().target_triple(true).build()?;
    let gitcl = GitclBuilder::default().sha(true).build()?;

    let emitted = Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&cargo)?
        .add_instructions(&gitcl)?
        .emit();

    // git コマンドが使えない環境では GITHUB_SHA 環境変数にフォールバック
    if emitted.is_err() {
        let sha = std::env::var("GITHUB_SHA")
            .map(|sha| sha.chars().take(7).collect::<String>())
            .unwrap_or_else(|_| UNKNOWN.to_string());
        println!("cargo::rustc-env=VERGEN_GIT_SHA={sha}");
        println!("cargo::rustc-env=VERGEN_BUILD_DATE={UNKNOWN}");
        println!("cargo::rustc-env=VERGEN_CARGO_TARGET_TRIPLE={UNKNOWN}");
    }

    Ok(())
}
