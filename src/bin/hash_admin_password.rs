use bcrypt::{hash, DEFAULT_COST};
use std::io::{self, Write};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Health Chatbot - Admin Password Hash");
    println!("====================================");

    print!("Password: ");
    io::stdout().flush()?;
    let password = rpassword::read_password()?;

    if password.len() < 8 {
        eprintln!("Password must be at least 8 characters long");
        std::process::exit(1);
    }

    print!("Password (again): ");
    io::stdout().flush()?;
    let confirm = rpassword::read_password()?;

    if password != confirm {
        eprintln!("Passwords don't match");
        std::process::exit(1);
    }

    let password_hash = hash(&password, DEFAULT_COST)?;

    println!();
    println!("Copy this line to your .env file:");
    // Single quotes keep dotenv from expanding the `$` segments
    println!("ADMIN_PASSWORD_HASH='{}'", password_hash);
    Ok(())
}
