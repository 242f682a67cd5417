use std::sync::Arc;

use cardly::{
    config::BillingConfig,
    domain::{CreatePlanRequest, CreateUserRequest},
    notifications::NotificationDispatcher,
    payments::DisabledGateway,
    service::{lifecycle::AssignPlanRequest, ServiceContext},
};
use clap::Parser;
use fake::{
    faker::{internet::en::SafeEmail, name::en::Name},
    Fake,
};
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;

#[derive(Parser, Debug)]
#[command(about = "Seed a Cardly database with plans and sample users")]
struct Args {
    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://cardly.db?mode=rwc")]
    database_url: String,

    /// Number of sample users to create
    #[arg(long, default_value_t = 5)]
    users: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    println!("🌱 Starting database seeding...");

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&args.database_url)
        .await?;

    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let context = ServiceContext::new(
        db_pool.clone(),
        Arc::new(DisabledGateway),
        Arc::new(NotificationDispatcher::new()),
        &BillingConfig::default(),
    );

    println!("🗂  Creating plans...");
    let pro = context.plan_repo.create(CreatePlanRequest {
        name: "Pro".to_string(),
        price: Decimal::new(2000, 2),
        duration_days: 30,
        features: vec![
            "5 vcards".to_string(),
            "unlimited blocks".to_string(),
            "1 custom domains".to_string(),
            "analytics".to_string(),
        ],
    }).await?;

    let business = context.plan_repo.create(CreatePlanRequest {
        name: "Business".to_string(),
        price: Decimal::new(4900, 2),
        duration_days: 30,
        features: vec![
            "unlimited vcards".to_string(),
            "unlimited blocks".to_string(),
            "10 custom domains".to_string(),
            "analytics".to_string(),
            "password protection".to_string(),
            "remove branding".to_string(),
        ],
    }).await?;
    println!("  ✅ Created plans {} and {}", pro.name, business.name);

    println!("👥 Creating users...");
    let admin = context.user_repo.create(CreateUserRequest {
        email: "admin@cardly.local".to_string(),
        name: "Admin User".to_string(),
        is_admin: true,
    }).await?;

    let mut users = Vec::with_capacity(args.users);
    for _ in 0..args.users {
        let user = context.user_repo.create(CreateUserRequest {
            email: SafeEmail().fake(),
            name: Name().fake(),
            is_admin: false,
        }).await?;
        users.push(user);
    }
    println!("  ✅ Created admin and {} users", users.len());

    println!("🎟  Assigning plans...");
    let mut assigned = 0;
    for (i, user) in users.iter().enumerate() {
        let (plan_id, duration) = match i % 3 {
            0 => (pro.id, "3"),
            1 => (business.id, "unlimited"),
            _ => continue,
        };

        context.lifecycle.assign_plan(AssignPlanRequest {
            user_id: user.id,
            plan_id,
            duration: duration.to_string(),
            unit: "months".to_string(),
        }).await?;
        assigned += 1;
    }
    println!("  ✅ Assigned {} subscriptions", assigned);

    println!("\n✨ Database seeding complete!");
    println!("\n📝 Try it:");
    println!("  curl -H 'X-User-Id: {}' http://127.0.0.1:8080/admin/expired-check -X POST", admin.id);
    for user in &users {
        println!("  {} <{}>  X-User-Id: {}", user.name, user.email, user.id);
    }

    Ok(())
}
