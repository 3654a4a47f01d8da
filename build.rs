fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Embed Windows resources when present
    #[cfg(target_os = "windows")]
    {
        let mut res = winres::WindowsResource::new();
        res.set("ProductName", "ZakirFLIX");
        res.set("FileDescription", "ZakirFLIX media catalog");

        if std::path::Path::new("app.manifest").exists() {
            res.set_manifest_file("app.manifest");
        }
        if std::path::Path::new("assets/icon.ico").exists() {
            res.set_icon("assets/icon.ico");
        }

        if let Err(e) = res.compile() {
            eprintln!("Warning: Failed to embed Windows resources: {}", e);
        }
    }
}
