use crate::api::{ApiError, ApiErrorKind, DbClient, Subscription};
use crate::auth::{redirect_for, FormErrors, Screen};
use crate::components::ui::{
    Alert, AlertDescription, Button, ButtonSize, ButtonVariant, Card, CardContent,
    CardDescription, CardHeader, CardItem, CardList, CardTitle, FieldError, Input, Label, Spinner,
    Textarea,
};
use crate::models::{category_label, Note, NoteFilter, Session, FILTER_ALL, UNCATEGORIZED};
use crate::repo::{RepoError, RepoResult, Repository};
use crate::state::{AppContext, AppState};
use crate::util::{copy_to_clipboard, now_ms};
use crate::workspace::{DeleteConfirm, Intent, NoticeLevel, Workspace};
use leptos::ev;
use leptos::logging::{error, log, warn};
use leptos::prelude::*;
use leptos::task::spawn_local;
use leptos_dom::helpers::window_event_listener;
use leptos_router::hooks::use_navigate;
use std::rc::Rc;
use wasm_bindgen::JsCast;

/// How long a workspace notice stays on screen.
const NOTICE_MS: i32 = 3_000;

/// Revalidate the persisted session once per page load.
fn ensure_session_checked(app_state: AppState) {
    if app_state.session_checked.get_untracked() {
        return;
    }
    let Some(session) = app_state.session.get_untracked() else {
        app_state.session_checked.set(true);
        return;
    };

    let controller = app_state.controller();
    spawn_local(async move {
        let restored = controller.restore(session, now_ms()).await;
        if restored.is_none() {
            log!("[auth] persisted session dropped");
        }
        app_state.set_session(restored);
        app_state.session_checked.set(true);
    });
}

/// Exchange the refresh token after the store rejected the id token.
/// Signs out when that fails too.
fn refresh_session(app_state: AppState) {
    let Some(session) = app_state.session.get_untracked() else {
        return;
    };
    let controller = app_state.controller();
    spawn_local(async move {
        let stale = Session {
            expires_at_ms: 0,
            ..session
        };
        let refreshed = controller.restore(stale, now_ms()).await;
        if refreshed.is_none() {
            warn!("[auth] token refresh failed, signing out");
        }
        app_state.set_session(refreshed);
    });
}

#[component]
pub fn SignInPage() -> impl IntoView {
    let AppContext(app_state) = expect_context::<AppContext>();
    let navigate = StoredValue::new(use_navigate());

    let email: RwSignal<String> = RwSignal::new(String::new());
    let password: RwSignal<String> = RwSignal::new(String::new());
    let errors: RwSignal<FormErrors> = RwSignal::new(FormErrors::default());
    let notice: RwSignal<Option<String>> = RwSignal::new(None);
    let logging_in: RwSignal<bool> = RwSignal::new(false);
    let signing_up: RwSignal<bool> = RwSignal::new(false);
    let busy = move || logging_in.get() || signing_up.get();

    ensure_session_checked(app_state);

    Effect::new(move |_| {
        if !app_state.session_checked.get() {
            return;
        }
        if let Some(screen) = redirect_for(Screen::SignIn, app_state.session.get().as_ref()) {
            navigate.with_value(|nav| nav(screen.path(), Default::default()));
        }
    });

    let on_login = move |ev: web_sys::SubmitEvent| {
        ev.prevent_default();
        if logging_in.get_untracked() || signing_up.get_untracked() {
            return;
        }

        let email_val = email.get_untracked();
        let password_val = password.get_untracked();
        let controller = app_state.controller();

        errors.set(FormErrors::default());
        notice.set(None);
        logging_in.set(true);

        spawn_local(async move {
            match controller.login(&email_val, &password_val).await {
                Ok(session) => {
                    app_state.set_session(Some(session));
                    app_state.session_checked.set(true);
                }
                Err(failure) => errors.set(FormErrors::from_failure(&failure)),
            }
            logging_in.set(false);
        });
    };

    let on_signup = move |_| {
        if logging_in.get_untracked() || signing_up.get_untracked() {
            return;
        }

        let email_val = email.get_untracked();
        let password_val = password.get_untracked();
        let controller = app_state.controller();

        errors.set(FormErrors::default());
        notice.set(None);
        signing_up.set(true);

        spawn_local(async move {
            match controller.signup(&email_val, &password_val).await {
                Ok(registered) => {
                    password.set(String::new());
                    notice.set(Some(format!(
                        "Account created for {registered}. Log in to continue."
                    )));
                }
                Err(failure) => errors.set(FormErrors::from_failure(&failure)),
            }
            signing_up.set(false);
        });
    };

    view! {
        <div class="min-h-screen bg-background">
            <div class="mx-auto flex min-h-screen w-full max-w-sm flex-col justify-center px-4 py-10">
                <div class="mb-6 flex items-center justify-center">
                    <span class="text-sm font-medium text-foreground">"Notepad"</span>
                </div>

                <Card>
                    <CardHeader>
                        <CardTitle class="text-lg">"Log in"</CardTitle>
                        <CardDescription class="text-xs">
                            "Use your email and password, or create a new account."
                        </CardDescription>
                    </CardHeader>

                    <CardContent>
                        <form class="flex flex-col gap-3" on:submit=on_login>
                            <div class="flex flex-col gap-1.5">
                                <Label html_for="email" class="text-xs">"Email"</Label>
                                <Input
                                    id="email"
                                    r#type="email"
                                    autocomplete="email"
                                    placeholder="you@example.com"
                                    bind_value=email
                                    invalid=Signal::derive(move || errors.with(|e| e.email.is_some()))
                                    class="h-8 text-sm"
                                />
                                <FieldError message=Signal::derive(move || errors.with(|e| e.email.clone())) />
                            </div>

                            <div class="flex flex-col gap-1.5">
                                <Label html_for="password" class="text-xs">"Password"</Label>
                                <Input
                                    id="password"
                                    r#type="password"
                                    autocomplete="current-password"
                                    placeholder="••••••••"
                                    bind_value=password
                                    invalid=Signal::derive(move || errors.with(|e| e.password.is_some()))
                                    class="h-8 text-sm"
                                />
                                <FieldError message=Signal::derive(move || errors.with(|e| e.password.clone())) />
                            </div>

                            <Show when=move || errors.with(|e| e.general.is_some()) fallback=|| ().into_view()>
                                <Alert class="border-destructive/30">
                                    <AlertDescription class="text-destructive text-xs">
                                        {move || errors.with(|e| e.general.clone().unwrap_or_default())}
                                    </AlertDescription>
                                </Alert>
                            </Show>

                            <Show when=move || notice.get().is_some() fallback=|| ().into_view()>
                                <Alert>
                                    <AlertDescription class="text-xs">
                                        {move || notice.get().unwrap_or_default()}
                                    </AlertDescription>
                                </Alert>
                            </Show>

                            <div class="flex items-center gap-2 pt-1">
                                <Button
                                    class="flex-1"
                                    size=ButtonSize::Sm
                                    attr:disabled=busy
                                >
                                    <span class="inline-flex items-center gap-2">
                                        <Show when=move || logging_in.get() fallback=|| ().into_view()>
                                            <Spinner />
                                        </Show>
                                        {move || if logging_in.get() { "Signing in..." } else { "Log in" }}
                                    </span>
                                </Button>
                                <Button
                                    class="flex-1"
                                    variant=ButtonVariant::Outline
                                    size=ButtonSize::Sm
                                    attr:r#type="button"
                                    attr:disabled=busy
                                    on:click=on_signup
                                >
                                    <span class="inline-flex items-center gap-2">
                                        <Show when=move || signing_up.get() fallback=|| ().into_view()>
                                            <Spinner />
                                        </Show>
                                        {move || if signing_up.get() { "Creating..." } else { "Sign up" }}
                                    </span>
                                </Button>
                            </div>
                        </form>
                    </CardContent>
                </Card>
            </div>
        </div>
    }
}

/// Collapse a repository result into what the workspace needs, refreshing the
/// session when the store rejected the token.
fn settled<T>(app_state: AppState, res: RepoResult<T>) -> Result<(), String> {
    match res {
        Ok(_) => Ok(()),
        Err(RepoError::Store(e)) if e.kind == ApiErrorKind::Unauthorized => {
            refresh_session(app_state);
            Err(e.to_string())
        }
        Err(e) => Err(e.to_string()),
    }
}

#[component]
pub fn DashboardPage() -> impl IntoView {
    let AppContext(app_state) = expect_context::<AppContext>();
    let navigate = StoredValue::new(use_navigate());

    let ws: RwSignal<Workspace> = RwSignal::new(Workspace::default());
    let repo: StoredValue<Option<Repository<DbClient>>> = StoredValue::new(None);
    let subscriptions = StoredValue::new_local(Vec::<Subscription>::new());

    // Text buffers bound to the inputs; copied into the workspace on submit.
    let draft: RwSignal<String> = RwSignal::new(String::new());
    let new_category: RwSignal<String> = RwSignal::new(String::new());
    let edit_buffer: RwSignal<String> = RwSignal::new(String::new());
    let scratch: RwSignal<String> = RwSignal::new(String::new());

    ensure_session_checked(app_state);

    Effect::new(move |_| {
        if !app_state.session_checked.get() {
            return;
        }
        if let Some(screen) = redirect_for(Screen::Workspace, app_state.session.get().as_ref()) {
            navigate.with_value(|nav| nav(screen.path(), Default::default()));
        }
    });

    // (Re)subscribe whenever the session changes, e.g. after a token refresh.
    Effect::new(move |_| {
        let checked = app_state.session_checked.get();
        let session = app_state.session.get();

        subscriptions.update_value(|subs| subs.drain(..).for_each(Subscription::cancel));
        repo.set_value(None);

        if !checked {
            return;
        }
        let Some(session) = session else {
            return;
        };
        let Some(r) = Repository::for_session(app_state.db_client(&session), Some(&session))
        else {
            return;
        };

        let on_error: Rc<dyn Fn(ApiError)> = Rc::new(move |e: ApiError| {
            error!("[workspace] live updates stopped: {e}");
            if e.kind == ApiErrorKind::Unauthorized {
                refresh_session(app_state);
            } else {
                ws.update(|w| w.error(format!("Live updates stopped: {e}")));
            }
        });

        let mut handles = Vec::new();
        match r.subscribe_notes(
            move |notes| ws.update(|w| w.replace_notes(notes)),
            on_error.clone(),
        ) {
            Ok(h) => handles.push(h),
            Err(e) => on_error(e),
        }
        match r.subscribe_categories(
            move |cats| ws.update(|w| w.replace_categories(cats)),
            on_error.clone(),
        ) {
            Ok(h) => handles.push(h),
            Err(e) => on_error(e),
        }

        subscriptions.set_value(handles);
        repo.set_value(Some(r));
    });

    on_cleanup(move || {
        subscriptions.try_update_value(|subs| subs.drain(..).for_each(Subscription::cancel));
    });

    // Escape backs out of a pending delete or an unsaved edit.
    let escape = window_event_listener(ev::keydown, move |ev| {
        if ev.key() != "Escape" {
            return;
        }
        ws.update(|w| {
            if w.delete != DeleteConfirm::Idle {
                w.cancel_delete();
            } else if w.editing.as_ref().is_some_and(|e| !e.saving) {
                w.cancel_edit();
            }
        });
    });
    on_cleanup(move || escape.remove());

    // Notices clear themselves unless replaced in the meantime.
    Effect::new(move |_| {
        let Some(seq) = ws.with(|w| w.notice.as_ref().map(|n| n.seq)) else {
            return;
        };
        let _ = window().set_timeout_with_callback_and_timeout_and_arguments_0(
            wasm_bindgen::closure::Closure::once_into_js(move || {
                ws.update(|w| w.expire_notice(seq));
            })
            .as_ref()
            .unchecked_ref(),
            NOTICE_MS,
        );
    });

    let run = move |intent: Intent| {
        let intent = match intent {
            Intent::Copy(text) => {
                spawn_local(async move {
                    let res = copy_to_clipboard(&text).await;
                    if let Err(e) = &res {
                        warn!("[workspace] clipboard write failed: {e}");
                    }
                    ws.update(|w| w.copy_settled(res));
                });
                return;
            }
            other => other,
        };

        let Some(r) = repo.get_value() else {
            warn!("[workspace] no repository, dropping {intent:?}");
            return;
        };

        spawn_local(async move {
            match intent {
                Intent::AddNote { content, filter } => {
                    let res = settled(app_state, r.add_note(&content, &filter).await);
                    ws.update(|w| w.draft_settled(res));
                    if let Some(d) = ws.try_with_untracked(|w| w.draft.clone()) {
                        draft.set(d);
                    }
                }
                Intent::UpdateNote {
                    note_id,
                    content,
                    filter,
                } => {
                    let res = settled(app_state, r.update_note(&note_id, &content, &filter).await);
                    ws.update(|w| w.edit_settled(&note_id, res));
                }
                Intent::DeleteNote(note_id) => {
                    let res = settled(app_state, r.delete_note(&note_id).await);
                    ws.update(|w| w.delete_settled(res));
                }
                Intent::AddCategory(name) => {
                    let res = settled(app_state, r.add_category(&name).await);
                    ws.update(|w| w.category_settled(res));
                    if let Some(c) = ws.try_with_untracked(|w| w.new_category.clone()) {
                        new_category.set(c);
                    }
                }
                Intent::Copy(_) => {}
            }
        });
    };

    let on_add_note = move |_| {
        let intent = ws
            .try_update(|w| {
                w.draft = draft.get_untracked();
                w.submit_draft()
            })
            .flatten();
        if let Some(intent) = intent {
            run(intent);
        }
    };

    let on_add_category = move |_| {
        let intent = ws
            .try_update(|w| {
                w.new_category = new_category.get_untracked();
                w.submit_category()
            })
            .flatten();
        if let Some(intent) = intent {
            run(intent);
        }
    };

    let on_filter_change = move |ev: web_sys::Event| {
        let value = event_target_value(&ev);
        ws.update(|w| w.select_filter(NoteFilter::from_select_value(&value)));
    };

    let on_sign_out = move |_| {
        subscriptions.update_value(|subs| subs.drain(..).for_each(Subscription::cancel));
        repo.set_value(None);
        app_state.set_session(None);
        log!("[auth] signed out");
        navigate.with_value(|nav| nav(Screen::SignIn.path(), Default::default()));
    };

    let on_confirm_delete = move |_| {
        if let Some(intent) = ws.try_update(|w| w.confirm_delete()).flatten() {
            run(intent);
        }
    };

    let on_copy_scratch = move |_| {
        let intent = ws
            .try_update(|w| {
                w.scratch = scratch.get_untracked();
                w.copy_scratch()
            })
            .flatten();
        if let Some(intent) = intent {
            run(intent);
        }
    };

    let adding = move || ws.with(|w| w.adding);
    let editing_saving = move || ws.with(|w| w.editing.as_ref().is_some_and(|e| e.saving));

    let note_row = move |note: Note| {
        let id = StoredValue::new(note.id.clone());
        let is_editing = move || ws.with(|w| w.is_editing(&id.get_value()));
        let label = {
            let category = note.category.clone();
            move || ws.with(|w| category_label(&w.categories, &category))
        };
        let content = note.content.clone();

        view! {
            <CardItem>
                <div class="flex items-center justify-between gap-2">
                    <span class="rounded bg-muted px-1.5 py-0.5 text-[11px] text-muted-foreground">
                        {label}
                    </span>
                </div>

                <Show
                    when=is_editing
                    fallback=move || {
                        let content = content.clone();
                        view! {
                            <p class="whitespace-pre-wrap break-words text-sm">{content}</p>
                            <div class="flex flex-wrap items-center gap-1">
                                <Button
                                    variant=ButtonVariant::Ghost
                                    size=ButtonSize::Xs
                                    on:click=move |_| {
                                        ws.update(|w| w.begin_edit(&id.get_value()));
                                        if let Some(buf) = ws.with_untracked(|w| {
                                            w.editing.as_ref().map(|e| e.buffer.clone())
                                        }) {
                                            edit_buffer.set(buf);
                                        }
                                    }
                                >
                                    "Edit"
                                </Button>
                                <Button
                                    variant=ButtonVariant::Ghost
                                    size=ButtonSize::Xs
                                    on:click=move |_| {
                                        if let Some(intent) = ws.with_untracked(|w| w.copy_note(&id.get_value())) {
                                            run(intent);
                                        }
                                    }
                                >
                                    "Copy"
                                </Button>
                                <Button
                                    variant=ButtonVariant::Ghost
                                    size=ButtonSize::Xs
                                    on:click=move |_| {
                                        ws.update(|w| w.stage_from_note(&id.get_value()));
                                        scratch.set(ws.with_untracked(|w| w.scratch.clone()));
                                    }
                                >
                                    "Create from note"
                                </Button>
                                <Button
                                    variant=ButtonVariant::Ghost
                                    size=ButtonSize::Xs
                                    class="text-destructive"
                                    on:click=move |_| ws.update(|w| w.request_delete(&id.get_value()))
                                >
                                    "Delete"
                                </Button>
                            </div>
                        }
                    }
                >
                    <Textarea bind_value=edit_buffer rows=4 disabled=Signal::derive(editing_saving) />
                    <div class="flex items-center gap-1">
                        <Button
                            size=ButtonSize::Xs
                            attr:disabled=editing_saving
                            on:click=move |_| {
                                let intent = ws
                                    .try_update(|w| {
                                        w.set_edit_buffer(edit_buffer.get_untracked());
                                        w.save_edit()
                                    })
                                    .flatten();
                                if let Some(intent) = intent {
                                    run(intent);
                                }
                            }
                        >
                            <span class="inline-flex items-center gap-1">
                                <Show when=editing_saving fallback=|| ().into_view()>
                                    <Spinner class="size-3" />
                                </Show>
                                "Save"
                            </span>
                        </Button>
                        <Button
                            variant=ButtonVariant::Outline
                            size=ButtonSize::Xs
                            attr:disabled=editing_saving
                            on:click=move |_| ws.update(|w| w.cancel_edit())
                        >
                            "Cancel"
                        </Button>
                    </div>
                </Show>
            </CardItem>
        }
    };

    view! {
        <div class="min-h-screen bg-background">
            <header class="border-b border-border">
                <div class="mx-auto flex max-w-3xl items-center justify-between px-4 py-3">
                    <span class="text-sm font-medium">"Notepad"</span>
                    <div class="flex items-center gap-3">
                        <span class="text-xs text-muted-foreground">
                            {move || app_state.session.with(|s| s.as_ref().map(|s| s.email.clone()).unwrap_or_default())}
                        </span>
                        <Button variant=ButtonVariant::Outline size=ButtonSize::Sm on:click=on_sign_out>
                            "Sign out"
                        </Button>
                    </div>
                </div>
            </header>

            <main class="mx-auto flex max-w-3xl flex-col gap-4 px-4 py-6">
                {move || ws.with(|w| w.notice.clone()).map(|n| {
                    let (class, text_class) = match n.level {
                        NoticeLevel::Info => ("", "text-xs"),
                        NoticeLevel::Error => ("border-destructive/30", "text-destructive text-xs"),
                    };
                    view! {
                        <Alert class=class>
                            <AlertDescription class=text_class>{n.text}</AlertDescription>
                        </Alert>
                    }
                })}

                <Card class="gap-3 py-4">
                    <CardHeader class="px-4">
                        <CardTitle class="text-sm">"New note"</CardTitle>
                    </CardHeader>
                    <CardContent class="flex flex-col gap-2 px-4">
                        <Textarea
                            id="new-note"
                            placeholder="Write something..."
                            rows=3
                            bind_value=draft
                            disabled=Signal::derive(adding)
                        />
                        <div class="flex items-center justify-between gap-2">
                            <span class="text-xs text-muted-foreground">
                                {move || ws.with(|w| match &w.filter {
                                    NoteFilter::All => format!("Saved as {UNCATEGORIZED}"),
                                    NoteFilter::Category(id) => format!("Saved in {}", category_label(&w.categories, id)),
                                })}
                            </span>
                            <Button size=ButtonSize::Sm attr:disabled=adding on:click=on_add_note>
                                <span class="inline-flex items-center gap-2">
                                    <Show when=adding fallback=|| ().into_view()>
                                        <Spinner />
                                    </Show>
                                    "Add note"
                                </span>
                            </Button>
                        </div>
                    </CardContent>
                </Card>

                <Card class="gap-3 py-4">
                    <CardHeader class="px-4">
                        <CardTitle class="text-sm">"Notes"</CardTitle>
                    </CardHeader>
                    <CardContent class="flex flex-col gap-3 px-4">
                        <div class="flex flex-wrap items-end gap-2">
                            <div class="flex flex-col gap-1.5">
                                <Label html_for="category-filter" class="text-xs">"Category"</Label>
                                <select
                                    id="category-filter"
                                    class="h-8 rounded-md border border-input bg-transparent px-2 text-sm"
                                    prop:value=move || ws.with(|w| w.filter.select_value())
                                    on:change=on_filter_change
                                >
                                    <option value=FILTER_ALL>"All"</option>
                                    {move || ws.with(|w| w.categories.clone()).into_iter().map(|c| {
                                        view! { <option value=c.id.clone()>{c.name.clone()}</option> }
                                    }).collect_view()}
                                </select>
                            </div>
                            <div class="flex flex-1 items-center gap-2">
                                <Input
                                    placeholder="New category"
                                    bind_value=new_category
                                    class="h-8 text-sm"
                                />
                                <Button
                                    variant=ButtonVariant::Outline
                                    size=ButtonSize::Sm
                                    attr:disabled=move || ws.with(|w| w.adding_category)
                                    on:click=on_add_category
                                >
                                    "Add category"
                                </Button>
                            </div>
                        </div>

                        <Show
                            when=move || ws.with(|w| !w.visible_notes().is_empty())
                            fallback=|| view! { <div class="text-xs text-muted-foreground">"No notes yet."</div> }
                        >
                            <CardList>
                                <For
                                    each=move || ws.with(|w| w.visible_notes())
                                    key=|n: &Note| (n.id.clone(), n.content.clone(), n.category.clone())
                                    children=note_row
                                />
                            </CardList>
                        </Show>
                    </CardContent>
                </Card>

                <Card class="gap-3 py-4">
                    <CardHeader class="px-4">
                        <CardTitle class="text-sm">"Scratch"</CardTitle>
                        <CardDescription class="text-xs">
                            "Not saved. Use \"Create from note\" to start from an existing note."
                        </CardDescription>
                    </CardHeader>
                    <CardContent class="flex flex-col gap-2 px-4">
                        <Textarea rows=4 bind_value=scratch />
                        <div class="flex items-center gap-2">
                            <Button variant=ButtonVariant::Outline size=ButtonSize::Sm on:click=on_copy_scratch>
                                "Copy"
                            </Button>
                            <Button
                                variant=ButtonVariant::Ghost
                                size=ButtonSize::Sm
                                on:click=move |_| {
                                    scratch.set(String::new());
                                    ws.update(|w| w.scratch.clear());
                                }
                            >
                                "Clear"
                            </Button>
                        </div>
                    </CardContent>
                </Card>
            </main>

            <Show
                when=move || ws.with(|w| matches!(w.delete, DeleteConfirm::Confirming(_)))
                fallback=|| ().into_view()
            >
                <div class="fixed inset-0 z-50 flex items-center justify-center bg-black/30 px-4">
                    <div class="w-full max-w-sm rounded-md border border-border bg-background p-4 shadow-lg">
                        <div class="mb-3 space-y-1">
                            <div class="text-sm font-medium text-destructive">"Delete note"</div>
                            <div class="text-xs text-muted-foreground">"This cannot be undone."</div>
                        </div>
                        <div class="flex items-center justify-end gap-2 pt-2">
                            <Button
                                variant=ButtonVariant::Outline
                                size=ButtonSize::Sm
                                on:click=move |_| ws.update(|w| w.cancel_delete())
                            >
                                "Cancel"
                            </Button>
                            <Button
                                variant=ButtonVariant::Destructive
                                size=ButtonSize::Sm
                                on:click=on_confirm_delete
                            >
                                "Delete"
                            </Button>
                        </div>
                    </div>
                </div>
            </Show>
        </div>
    }
}
