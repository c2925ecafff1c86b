use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rust_decimal::Decimal;

use catering_core::{DishId, IngredientId, MenuId};
use catering_inventory::{
    Dish, Menu, Requirement, StockPlan, StockSnapshot, all_menus_stock, max_orders_for_menu,
};

/// Catalog of `menus` menus, 6 dishes each, 8 ingredients per dish drawn from
/// a shared pool so bottlenecks overlap the way real catalogs do.
fn catalog(menus: usize) -> (Vec<Menu>, StockSnapshot) {
    let pool: Vec<IngredientId> = (0..200).map(|_| IngredientId::new()).collect();
    let mut levels = StockSnapshot::new();
    for (i, id) in pool.iter().enumerate() {
        levels.set_ingredient(*id, Decimal::from(1_000 + (i as i64 * 37) % 5_000));
    }

    let menus = (0..menus)
        .map(|m| Menu {
            id: MenuId::new(),
            name: format!("menu-{m}"),
            person_min: 10,
            remaining_qty: 50,
            price_per_person: Decimal::from(30),
            published: true,
            dishes: (0..6)
                .map(|d| Dish {
                    id: DishId::new(),
                    name: format!("dish-{m}-{d}"),
                    requirements: (0..8)
                        .map(|r| Requirement {
                            ingredient_id: pool[(m * 13 + d * 7 + r * 3) % pool.len()],
                            quantity: Decimal::new(5 + r as i64 * 15, 2),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    (menus, levels)
}

fn bench_menu_availability(c: &mut Criterion) {
    let mut group = c.benchmark_group("stock_calculator");

    for size in [10usize, 100, 1_000] {
        let (menus, levels) = catalog(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("all_menus_stock", size), &size, |b, _| {
            b.iter(|| black_box(all_menus_stock(menus.iter(), &levels)));
        });

        group.bench_with_input(BenchmarkId::new("max_orders_for_menu", size), &size, |b, _| {
            b.iter(|| {
                for m in &menus {
                    black_box(max_orders_for_menu(m, &levels));
                }
            });
        });
    }

    group.finish();
}

fn bench_plan_checks(c: &mut Criterion) {
    let (menus, levels) = catalog(5);
    let plan = StockPlan::deduct(menus, 45);

    c.bench_function("stock_plan_shortages_5_menus", |b| {
        b.iter(|| black_box(plan.shortages(&levels)));
    });
}

criterion_group!(benches, bench_menu_availability, bench_plan_checks);
criterion_main!(benches);
