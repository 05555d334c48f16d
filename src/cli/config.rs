use crate::config::generate::generate_starter_config;
use std::fs;
use std::path::PathBuf;

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    // Prefer the per-user location, fall back to the system one
    let user_config = dirs::home_dir().map(|home| home.join(".config/logrelay/config.yml"));
    let config_path = match user_config {
        Some(path) => match path.parent().map(fs::create_dir_all) {
            Some(Err(e)) => {
                eprintln!("Warning: could not create {}: {}", path.display(), e);
                eprintln!("Falling back to /etc/logrelay/config.yml");
                PathBuf::from("/etc/logrelay/config.yml")
            }
            _ => path,
        },
        None => PathBuf::from("/etc/logrelay/config.yml"),
    };

    if config_path.exists() {
        return Err(format!(
            "config file already exists at {}; remove it first or use --stdout",
            config_path.display()
        )
        .into());
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&config_path, config_content)?;

    println!("Config file written to {}", config_path.display());
    Ok(())
}

pub fn validate(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path.ok_or("no config file found; use --config to specify a path")?;

    println!("Validating config file: {}", path.display());
    crate::config::load_config(&path)?;
    println!("Config is valid");
    Ok(())
}
