use leptos::prelude::*;
use leptos_ui::clx;

mod components {
    use super::*;
    clx! {Card, div, "bg-card text-card-foreground flex flex-col gap-4 rounded-xl border py-6 shadow-sm"}
    clx! {CardHeader, div, "flex flex-col items-start gap-1.5 px-6"}
    clx! {CardTitle, h2, "leading-none font-semibold"}
    clx! {CardDescription, p, "text-muted-foreground text-sm"}
    clx! {CardContent, div, "px-6"}

    // Note rows inside the workspace card.
    clx! {CardList, ul, "flex flex-col divide-y divide-border"}
    clx! {CardItem, li, "flex flex-col gap-2 py-3 first:pt-0 last:pb-0"}
}

pub use components::*;
